use serde::{Deserialize, Deserializer, Serialize};

/// The set of user ids expected to report on a given day.
///
/// Entries are trimmed, empty entries are dropped and duplicates collapse to
/// their first occurrence, so iteration order is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Roster(Vec<String>);

impl Roster {
    pub fn new<I, S>(user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ids: Vec<String> = Vec::new();
        for id in user_ids {
            let id = id.as_ref().trim();
            if !id.is_empty() && !ids.iter().any(|existing| existing == id) {
                ids.push(id.to_string());
            }
        }
        Self(ids)
    }

    /// Parse a comma-separated list such as `"U1, U2,,U3"`.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.0.iter().any(|id| id == user_id)
    }
}

impl<'de> Deserialize<'de> for Roster {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawRoster {
            List(Vec<String>),
            Csv(String),
        }

        Ok(match RawRoster::deserialize(deserializer)? {
            RawRoster::List(ids) => Roster::new(ids),
            RawRoster::Csv(list) => Roster::parse(&list),
        })
    }
}

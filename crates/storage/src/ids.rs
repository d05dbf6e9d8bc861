use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::error::{InvalidIdSnafu, StorageError, StorageResult};

// Backend ids are opaque strings (document ids); the macro keeps every wrapper identical.
macro_rules! define_record_id {
    ($name:ident, $id_type:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn parse(raw: &str) -> StorageResult<Self> {
                let trimmed = raw.trim();
                ensure!(
                    !trimmed.is_empty() && !trimmed.chars().any(char::is_whitespace),
                    InvalidIdSnafu {
                        stage: "parse-record-id",
                        id_type: $id_type,
                        raw: raw.to_string(),
                    }
                );
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(raw: &str) -> StorageResult<Self> {
                Self::parse(raw)
            }
        }

        impl TryFrom<String> for $name {
            type Error = StorageError;

            fn try_from(raw: String) -> StorageResult<Self> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_record_id!(UserId, "user-id");

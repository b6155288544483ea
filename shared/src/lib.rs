use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;

const URL_KEY: &str = "URL";

/// Body of `POST /classify`.
///
/// The `URL` key is matched case-insensitively; an exact `URL` wins over any
/// other spelling. A missing or `null` value leaves `url` empty.
#[derive(Debug, Serialize, Clone, Default)]
pub struct ClassifyRequest {
    #[serde(rename = "URL")]
    pub url: String,
}

impl<'de> Deserialize<'de> for ClassifyRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RequestVisitor;

        impl<'de> Visitor<'de> for RequestVisitor {
            type Value = ClassifyRequest;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object with a URL field")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut exact = None;
                let mut folded = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == URL_KEY {
                        exact = map.next_value::<Option<String>>()?;
                    } else if key.eq_ignore_ascii_case(URL_KEY) {
                        folded = map.next_value::<Option<String>>()?;
                    } else {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
                Ok(ClassifyRequest {
                    url: exact.or(folded).unwrap_or_default(),
                })
            }
        }

        deserializer.deserialize_map(RequestVisitor)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClassifyResponse {
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Desired attribute of the generated face, sent as the `gender` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Attribute {
    #[default]
    #[serde(rename = "random")]
    Random,
    #[serde(rename = "babyBoy")]
    BabyBoy,
    #[serde(rename = "babyGirl")]
    BabyGirl,
}

impl Attribute {
    /// Name for display in the CLI
    pub fn name(&self) -> &str {
        match self {
            Self::Random => "Random",
            Self::BabyBoy => "Boy",
            Self::BabyGirl => "Girl",
        }
    }

    /// Id used on the wire
    pub fn id(&self) -> &str {
        match self {
            Self::Random => "random",
            Self::BabyBoy => "babyBoy",
            Self::BabyGirl => "babyGirl",
        }
    }

    pub fn all() -> [Attribute; 3] {
        [Self::Random, Self::BabyBoy, Self::BabyGirl]
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = String;

    /// Accepts the wire ids as well as the short forms `boy` / `girl`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "boy" | "babyboy" => Ok(Self::BabyBoy),
            "girl" | "babygirl" => Ok(Self::BabyGirl),
            other => Err(format!(
                "unknown attribute '{other}', expected one of: random, boy, girl"
            )),
        }
    }
}

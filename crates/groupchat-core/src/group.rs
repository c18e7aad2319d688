use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(rename = "groupId")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prof_id: Option<String>,
    #[serde(default)]
    pub student_ids: Vec<String>,
    #[serde(default)]
    pub project_title: Option<String>,
    /// Project completion percentage, 0..=100.
    #[serde(default, deserialize_with = "lenient_progress")]
    pub progress: u8,
}

impl Group {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn has_member(&self, uid: &str) -> bool {
        self.prof_id.as_deref() == Some(uid) || self.student_ids.iter().any(|s| s == uid)
    }
}

/// Numbers are rounded and clamped to 0..=100; anything else reads as 0.
fn lenient_progress<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
        Other(IgnoredAny),
    }

    let pct = match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Int(n)) => n as f64,
        Some(Raw::Float(f)) => f,
        Some(Raw::Text(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Raw::Other(_)) | None => 0.0,
    };
    if pct.is_finite() {
        Ok(pct.round().clamp(0.0, 100.0) as u8)
    } else {
        Ok(0)
    }
}

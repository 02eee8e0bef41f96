use serde::{Deserialize, Serialize};

/// What a jurisdiction search tool advertises about itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub jurisdiction: String,
    #[serde(default)]
    pub specialties: Vec<String>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, jurisdiction: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            jurisdiction: jurisdiction.into(),
            specialties: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_specialties<I, S>(mut self, specialties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specialties = specialties.into_iter().map(Into::into).collect();
        self
    }

    /// One prompt line: `- name (jurisdiction; specialties): description`.
    pub fn prompt_line(&self) -> String {
        let mut line = format!("- {} ({}", self.name, self.jurisdiction);
        if !self.specialties.is_empty() {
            line.push_str("; ");
            line.push_str(&self.specialties.join(", "));
        }
        line.push(')');
        if !self.description.is_empty() {
            line.push_str(": ");
            line.push_str(&self.description);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_line_includes_specialties() {
        let d = ToolDescriptor::new("utah_search", "Utah")
            .with_description("Utah social media law")
            .with_specialties(["minors", "curfew"]);
        assert_eq!(
            d.prompt_line(),
            "- utah_search (Utah; minors, curfew): Utah social media law"
        );
    }

    #[test]
    fn descriptor_json_defaults() {
        let d: ToolDescriptor =
            serde_json::from_str(r#"{"name":"eu_search","jurisdiction":"European Union"}"#).unwrap();
        assert!(d.specialties.is_empty());
        assert_eq!(d.prompt_line(), "- eu_search (European Union)");
    }
}

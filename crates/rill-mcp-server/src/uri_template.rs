//! RFC 6570 level-1 URI templates for dynamic resources.
//!
//! A pattern like `res://users/{id}/avatar.{format}` compiles to an
//! anchored regex; matching extracts the variable bindings. Variables
//! match any run of non-slash characters.

use regex::Regex;
use std::collections::HashMap;

use rill_mcp_protocol::{McpError, McpResult};

/// A compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    pattern: String,
    regex: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    pub fn new(pattern: &str) -> McpResult<Self> {
        let var_regex = Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("static regex");

        let mut variables = Vec::new();
        for captures in var_regex.captures_iter(pattern) {
            let name = captures.get(1).expect("capture group").as_str();
            if variables.iter().any(|existing| existing == name) {
                return Err(McpError::invalid_params(format!(
                    "duplicate template variable '{name}' in '{pattern}'"
                )));
            }
            variables.push(name.to_string());
        }

        let mut regex_pattern = regex::escape(pattern);
        for name in &variables {
            let escaped_var = regex::escape(&format!("{{{name}}}"));
            regex_pattern = regex_pattern.replace(&escaped_var, "([^/]+)");
        }
        let regex = Regex::new(&format!("^{regex_pattern}$"))
            .map_err(|err| McpError::internal(format!("template compilation failed: {err}")))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            variables,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn matches(&self, uri: &str) -> bool {
        self.regex.is_match(uri)
    }

    /// Extract variable bindings from a matching URI.
    pub fn extract(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.regex.captures(uri)?;
        let mut bindings = HashMap::with_capacity(self.variables.len());
        for (index, name) in self.variables.iter().enumerate() {
            if let Some(value) = captures.get(index + 1) {
                bindings.insert(name.clone(), value.as_str().to_string());
            }
        }
        Some(bindings)
    }

    /// Expand the template with the given variable values.
    pub fn expand(&self, values: &HashMap<String, String>) -> McpResult<String> {
        let mut result = self.pattern.clone();
        for name in &self.variables {
            let value = values
                .get(name)
                .ok_or_else(|| McpError::missing_param(name.clone()))?;
            result = result.replace(&format!("{{{name}}}"), value);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_and_match() {
        let template = UriTemplate::new("res://users/{id}").unwrap();
        assert_eq!(template.variables(), &["id".to_string()]);
        assert!(template.matches("res://users/42"));
        assert!(!template.matches("res://users/42/avatar"));
        assert!(!template.matches("res://teams/42"));
    }

    #[test]
    fn test_extraction() {
        let template = UriTemplate::new("file:///{dir}/{name}.log").unwrap();
        let bindings = template.extract("file:///var/syslog.log").unwrap();
        assert_eq!(bindings["dir"], "var");
        assert_eq!(bindings["name"], "syslog");
    }

    #[test]
    fn test_variables_do_not_cross_slashes() {
        let template = UriTemplate::new("res://{a}/{b}").unwrap();
        assert!(template.extract("res://x/y/z").is_none());
    }

    #[test]
    fn test_expansion() {
        let template = UriTemplate::new("res://users/{id}").unwrap();
        let mut values = HashMap::new();
        values.insert("id".to_string(), "alice".to_string());
        assert_eq!(template.expand(&values).unwrap(), "res://users/alice");

        values.clear();
        assert!(template.expand(&values).is_err());
    }

    #[test]
    fn test_literal_pattern_matches_itself() {
        let template = UriTemplate::new("res://static/readme").unwrap();
        assert!(template.matches("res://static/readme"));
        assert!(template.extract("res://static/readme").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_variable_rejected() {
        assert!(UriTemplate::new("res://{id}/{id}").is_err());
    }

    #[test]
    fn test_regex_metacharacters_in_literals_are_escaped() {
        let template = UriTemplate::new("res://files/{name}.txt").unwrap();
        assert!(template.matches("res://files/a.txt"));
        assert!(!template.matches("res://files/axtxt"));
    }
}

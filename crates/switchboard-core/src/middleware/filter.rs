//! Per-entry filters deciding which bots a middleware applies to.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bot::Bot;
use crate::capability::Capabilities;
use crate::error::ConfigError;

/// Filter attached to a middleware entry.
///
/// An entry admits a bot only when every configured predicate holds:
///
/// - `bot_types_to_include`: the bot's type is in the set.
/// - `bot_types_to_exclude`: the bot's type is not in the set.
/// - `bot_receives`: the bot declares that receive capability as supported.
/// - `bot_sends`: the bot declares that send capability as supported.
///
/// Include and exclude cannot both be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFilterOptions")]
pub struct FilterOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    bot_types_to_include: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bot_types_to_exclude: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bot_receives: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bot_sends: Option<String>,
}

impl FilterOptions {
    /// Options that admit every bot.
    pub fn any() -> Self {
        Self::default()
    }

    /// Admits only bots whose type is in `types`.
    pub fn include_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bot_types_to_include: Some(types.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Admits only bots whose type is not in `types`.
    pub fn exclude_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bot_types_to_exclude: Some(types.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Admits only bots that can receive `capability`.
    pub fn receives(capability: impl Into<String>) -> Self {
        Self {
            bot_receives: Some(capability.into()),
            ..Self::default()
        }
    }

    /// Admits only bots that can send `capability`.
    pub fn sends(capability: impl Into<String>) -> Self {
        Self {
            bot_sends: Some(capability.into()),
            ..Self::default()
        }
    }

    /// Adds a receive capability requirement.
    pub fn and_receives(mut self, capability: impl Into<String>) -> Self {
        self.bot_receives = Some(capability.into());
        self
    }

    /// Adds a send capability requirement.
    pub fn and_sends(mut self, capability: impl Into<String>) -> Self {
        self.bot_sends = Some(capability.into());
        self
    }

    /// Starts a builder that validates the combination on `build`.
    pub fn builder() -> FilterOptionsBuilder {
        FilterOptionsBuilder::default()
    }

    /// Decodes options from a JSON value.
    ///
    /// Non-object values are rejected with [`ConfigError::OptionsNotMapping`].
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::OptionsNotMapping {
                found: json_type_name(value),
            });
        }
        let raw: RawFilterOptions = serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::InvalidFilterOptions(e.to_string()))?;
        raw.try_into()
    }

    /// Returns the include set, if any.
    pub fn bot_types_to_include(&self) -> Option<&BTreeSet<String>> {
        self.bot_types_to_include.as_ref()
    }

    /// Returns the exclude set, if any.
    pub fn bot_types_to_exclude(&self) -> Option<&BTreeSet<String>> {
        self.bot_types_to_exclude.as_ref()
    }

    /// Returns the required receive capability, if any.
    pub fn bot_receives(&self) -> Option<&str> {
        self.bot_receives.as_deref()
    }

    /// Returns the required send capability, if any.
    pub fn bot_sends(&self) -> Option<&str> {
        self.bot_sends.as_deref()
    }

    /// Evaluates the filter against a bot description.
    pub fn matches(&self, bot_type: &str, receives: &Capabilities, sends: &Capabilities) -> bool {
        if let Some(include) = &self.bot_types_to_include
            && !include.contains(bot_type)
        {
            return false;
        }
        if let Some(exclude) = &self.bot_types_to_exclude
            && exclude.contains(bot_type)
        {
            return false;
        }
        if let Some(capability) = &self.bot_receives
            && !receives.supports(capability)
        {
            return false;
        }
        if let Some(capability) = &self.bot_sends
            && !sends.supports(capability)
        {
            return false;
        }
        true
    }

    /// Evaluates the filter against a bot.
    pub fn admits(&self, bot: &Bot) -> bool {
        self.matches(bot.bot_type(), bot.receives(), bot.sends())
    }
}

/// Builder for [`FilterOptions`].
#[derive(Debug, Clone, Default)]
pub struct FilterOptionsBuilder {
    raw: RawFilterOptions,
}

impl FilterOptionsBuilder {
    /// Adds a bot type to the include set.
    pub fn include_type(mut self, bot_type: impl Into<String>) -> Self {
        self.raw
            .bot_types_to_include
            .get_or_insert_with(OneOrMany::default)
            .push(bot_type.into());
        self
    }

    /// Adds a bot type to the exclude set.
    pub fn exclude_type(mut self, bot_type: impl Into<String>) -> Self {
        self.raw
            .bot_types_to_exclude
            .get_or_insert_with(OneOrMany::default)
            .push(bot_type.into());
        self
    }

    /// Requires a receive capability.
    pub fn receives(mut self, capability: impl Into<String>) -> Self {
        self.raw.bot_receives = Some(capability.into());
        self
    }

    /// Requires a send capability.
    pub fn sends(mut self, capability: impl Into<String>) -> Self {
        self.raw.bot_sends = Some(capability.into());
        self
    }

    /// Validates and builds the options.
    pub fn build(self) -> Result<FilterOptions, ConfigError> {
        self.raw.try_into()
    }
}

/// A single type name or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl OneOrMany {
    fn push(&mut self, value: String) {
        match self {
            Self::One(existing) => *self = Self::Many(vec![std::mem::take(existing), value]),
            Self::Many(values) => values.push(value),
        }
    }

    fn into_set(self) -> BTreeSet<String> {
        match self {
            Self::One(value) => BTreeSet::from([value]),
            Self::Many(values) => values.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFilterOptions {
    #[serde(default, alias = "botTypesToInclude")]
    bot_types_to_include: Option<OneOrMany>,
    #[serde(default, alias = "botTypesToExclude")]
    bot_types_to_exclude: Option<OneOrMany>,
    #[serde(default, alias = "botReceives")]
    bot_receives: Option<String>,
    #[serde(default, alias = "botSends")]
    bot_sends: Option<String>,
}

impl TryFrom<RawFilterOptions> for FilterOptions {
    type Error = ConfigError;

    fn try_from(raw: RawFilterOptions) -> Result<Self, Self::Error> {
        if raw.bot_types_to_include.is_some() && raw.bot_types_to_exclude.is_some() {
            return Err(ConfigError::ConflictingBotTypeFilters);
        }
        Ok(Self {
            bot_types_to_include: raw.bot_types_to_include.map(OneOrMany::into_set),
            bot_types_to_exclude: raw.bot_types_to_exclude.map(OneOrMany::into_set),
            bot_receives: raw.bot_receives,
            bot_sends: raw.bot_sends,
        })
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn caps(names: &[&str]) -> Capabilities {
        names.iter().map(|n| (*n, true)).collect()
    }

    #[test]
    fn test_empty_options_admit_everything() {
        assert!(FilterOptions::any().matches("mock", &Capabilities::new(), &Capabilities::new()));
    }

    #[test]
    fn test_include_and_exclude() {
        let none = Capabilities::new();
        let include = FilterOptions::include_types(["includeMe"]);
        assert!(include.matches("includeMe", &none, &none));
        assert!(!include.matches("dontIncludeMe", &none, &none));

        let exclude = FilterOptions::exclude_types(["excludeMe"]);
        assert!(!exclude.matches("excludeMe", &none, &none));
        assert!(exclude.matches("includeMe", &none, &none));
    }

    #[test]
    fn test_capability_predicates() {
        let options = FilterOptions::receives("text").and_sends("quickReply");
        assert!(options.matches("mock", &caps(&["text"]), &caps(&["quickReply"])));
        assert!(!options.matches("mock", &caps(&["text"]), &Capabilities::new()));
        let declared_false: Capabilities = [("text", false)].into_iter().collect();
        assert!(!options.matches("mock", &declared_false, &caps(&["quickReply"])));
    }

    #[test]
    fn test_builder_rejects_include_and_exclude() {
        let err = FilterOptions::builder()
            .include_type("a")
            .exclude_type("b")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::ConflictingBotTypeFilters);
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        let err = FilterOptions::from_value(&json!("botTypesToInclude")).unwrap_err();
        assert_eq!(err, ConfigError::OptionsNotMapping { found: "string" });
        assert_eq!(
            err.to_string(),
            "options can't be of type string. It needs to be an object"
        );
    }

    #[test]
    fn test_from_value_accepts_single_string_or_list() {
        let single = FilterOptions::from_value(&json!({ "botTypesToInclude": "includeMe" })).unwrap();
        let list =
            FilterOptions::from_value(&json!({ "bot_types_to_include": ["includeMe"] })).unwrap();
        assert_eq!(single, list);

        let err = FilterOptions::from_value(&json!({
            "botTypesToInclude": "a",
            "botTypesToExclude": ["b"],
        }))
        .unwrap_err();
        assert_eq!(err, ConfigError::ConflictingBotTypeFilters);
    }

    #[test]
    fn test_serde_enforces_exclusivity() {
        let result: Result<FilterOptions, _> = serde_json::from_value(json!({
            "bot_types_to_include": "a",
            "bot_types_to_exclude": "b",
        }));
        assert!(result.is_err());
    }
}

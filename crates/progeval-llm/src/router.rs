//! Prefix routing of namespaced model ids to provider ids.
//!
//! A model id like `bedrock/anthropic.claude-sonnet-4-5` is matched against
//! a table of prefix scopes; the longest matching prefix wins, with table
//! order breaking ties. Anthropic foundation-model ARNs are recognised
//! structurally by their segments rather than by substring search, so an
//! ARN for another AWS service can never route by accident.

/// Provider id for the Anthropic client.
pub const PROVIDER_ANTHROPIC: &str = "anthropic";

/// Provider id for the OpenAI-compatible client.
pub const PROVIDER_OPENAI: &str = "openai";

/// Default Anthropic scopes: base model ids plus the cross-region
/// inference-profile prefixes.
const ANTHROPIC_SCOPES: &[&str] = &[
    "bedrock/anthropic.",
    "bedrock/us.anthropic.",
    "bedrock/eu.anthropic.",
    "bedrock/apac.anthropic.",
    "bedrock/global.anthropic.",
];

const OPENAI_SCOPES: &[&str] = &["bedrock/openai."];

/// Immutable prefix table mapping model-id scopes to provider ids.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    scopes: Vec<(String, Vec<String>)>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    /// Table with the built-in scopes only.
    pub fn new() -> Self {
        Self {
            scopes: vec![
                (
                    PROVIDER_ANTHROPIC.to_string(),
                    ANTHROPIC_SCOPES.iter().map(|s| s.to_string()).collect(),
                ),
                (
                    PROVIDER_OPENAI.to_string(),
                    OPENAI_SCOPES.iter().map(|s| s.to_string()).collect(),
                ),
            ],
        }
    }

    /// Table extended with caller-supplied scopes. Extra scopes are merged
    /// into the defaults at construction; the merged table never changes
    /// afterwards.
    pub fn with_extra_scopes<'a>(
        extra: impl IntoIterator<Item = (&'a str, &'a [&'a str])>,
    ) -> Self {
        let mut table = Self::new();
        for (provider_id, prefixes) in extra {
            let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
            match table
                .scopes
                .iter_mut()
                .find(|(existing, _)| existing == provider_id)
            {
                Some((_, existing)) => existing.extend(prefixes),
                None => table.scopes.push((provider_id.to_string(), prefixes)),
            }
        }
        table
    }

    /// All prefixes currently routing to a provider, for diagnostics.
    pub fn scopes_for(&self, provider_id: &str) -> &[String] {
        self.scopes
            .iter()
            .find(|(id, _)| id == provider_id)
            .map(|(_, prefixes)| prefixes.as_slice())
            .unwrap_or(&[])
    }

    /// Resolve a model id to a provider id, or `None` when nothing matches.
    pub fn route(&self, model_id: &str) -> Option<&str> {
        if is_anthropic_arn(model_id) {
            return Some(PROVIDER_ANTHROPIC);
        }

        let mut best: Option<(&str, usize)> = None;
        for (provider_id, prefixes) in &self.scopes {
            for prefix in prefixes {
                if model_id.starts_with(prefix.as_str()) {
                    let better = match best {
                        Some((_, best_len)) => prefix.len() > best_len,
                        None => true,
                    };
                    if better {
                        best = Some((provider_id, prefix.len()));
                    }
                }
            }
        }
        best.map(|(provider_id, _)| provider_id)
    }
}

/// Strip the `bedrock/` namespace from a model id, leaving the identifier
/// Bedrock itself expects. Ids without the namespace pass through.
pub fn bedrock_model_name(model_id: &str) -> &str {
    model_id.strip_prefix("bedrock/").unwrap_or(model_id)
}

/// Whether the model id is an Anthropic foundation-model ARN.
///
/// Matches on ARN structure: `arn:{partition}:bedrock:{region}:{account}:
/// {resource}` with a `foundation-model/anthropic.*` resource. Any other
/// service, resource type, or model vendor does not match.
pub fn is_anthropic_arn(model_id: &str) -> bool {
    let Some(arn) = model_id.strip_prefix("bedrock/") else {
        return false;
    };
    let mut parts = arn.splitn(6, ':');
    let (Some(scheme), Some(_partition), Some(service), Some(_region), Some(_account)) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    let Some(resource) = parts.next() else {
        return false;
    };
    if scheme != "arn" || service != "bedrock" {
        return false;
    }
    resource
        .strip_prefix("foundation-model/")
        .map(|model| model.starts_with("anthropic."))
        .unwrap_or(false)
}

use super::ConfigError;

/// Maximum placeholder expansion depth before giving up.
const MAX_DEPTH: usize = 10;

/// Expand `${key}` and `${key:default}` placeholders in a template string.
///
/// Placeholder values are looked up through `resolver` and are themselves
/// expanded recursively. Self-referential chains and expansions deeper than
/// [`MAX_DEPTH`] fail with a [`ConfigError`].
pub(crate) fn expand<F>(template: &str, resolver: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut stack = Vec::new();
    expand_inner(template, resolver, &mut stack)
}

fn expand_inner<F>(
    template: &str,
    resolver: &F,
    stack: &mut Vec<String>,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if stack.len() > MAX_DEPTH {
        return Err(ConfigError::CircularPlaceholder(stack.join(" -> ")));
    }

    let mut result = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            ConfigError::Load(format!("unclosed placeholder in '{template}'"))
        })?;
        let inner = &after[..end];

        // `${key:default}`; the default may itself contain placeholders.
        let (key, default) = match inner.split_once(':') {
            Some((k, d)) => (k.trim(), Some(d)),
            None => (inner.trim(), None),
        };

        if stack.iter().any(|seen| seen == key) {
            let mut chain = stack.clone();
            chain.push(key.to_string());
            return Err(ConfigError::CircularPlaceholder(chain.join(" -> ")));
        }

        match resolver(key) {
            Some(value) => {
                stack.push(key.to_string());
                let expanded = expand_inner(&value, resolver, stack)?;
                stack.pop();
                result.push_str(&expanded);
            }
            None => match default {
                Some(d) => {
                    let expanded = expand_inner(d, resolver, stack)?;
                    result.push_str(&expanded);
                }
                None => {
                    return Err(ConfigError::UnresolvedPlaceholder(key.to_string()));
                }
            },
        }

        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

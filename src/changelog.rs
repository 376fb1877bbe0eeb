//! Changelog rendering.
//!
//! The default template prints one `###` heading per change group followed by
//! its commits, then a credits line. In flat mode every commit is listed
//! without headings and an empty list renders as `Initial release`.

use minijinja::Environment;
use serde::Serialize;

use crate::changes::{clean_title, pull_request_reference, ChangeGroup, ChangeType, IGNORE};
use crate::commit::Commit;
use crate::error::{Error, Result};

/// Body used in flat mode when there is nothing to list.
pub const INITIAL_RELEASE: &str = "Initial release";

/// Grouped changelog template.
pub const DEFAULT_TEMPLATE: &str = "\
{% for group in changes %}
### {{ group.name|plural(group.commits|length) }}

{% for commit in group.commits %}
- {{ commit.title }}{% if commit.reference %} (#{{ commit.reference }}){% endif %} #{{ commit.hash|short_hash }}
{% endfor %}

{% endfor %}
{% if credits %}
### Credits

Huge thanks to {{ credits|mentions }} for contributing!
{% endif %}
";

/// Flat list template.
pub const FLAT_TEMPLATE: &str = "\
{% for commit in commits %}
- {{ commit.title }}{% if commit.reference %} (#{{ commit.reference }}){% endif %} #{{ commit.hash|short_hash }}
{% endfor %}
";

/// A changelog line.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub title: String,
    pub hash: String,
    pub reference: Option<u64>,
}

impl Entry {
    fn from_commit(commit: &Commit, types: &[ChangeType]) -> Option<Self> {
        let message = commit.message()?;
        Some(Self {
            title: clean_title(&message, types),
            hash: commit.hash.clone(),
            reference: pull_request_reference(&message),
        })
    }
}

/// A changelog section.
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub handle: String,
    pub name: String,
    pub commits: Vec<Entry>,
}

/// Values available to templates.
#[derive(Debug, Clone, Serialize)]
pub struct ChangelogContext {
    pub tag: Option<String>,
    /// Grouped entries, in category order.
    pub changes: Vec<Section>,
    /// Every entry that is not ignored, oldest first.
    pub commits: Vec<Entry>,
    pub credits: Vec<String>,
}

impl ChangelogContext {
    pub fn new(
        tag: Option<String>,
        commits: &[Commit],
        groups: &[ChangeGroup],
        credits: &[String],
        types: &[ChangeType],
    ) -> Self {
        let changes = groups
            .iter()
            .map(|group| Section {
                handle: group.change_type.handle.clone(),
                name: group.change_type.name.clone(),
                commits: group
                    .commits
                    .iter()
                    .filter_map(|c| Entry::from_commit(c, types))
                    .collect(),
            })
            .filter(|section| !section.commits.is_empty())
            .collect();

        let commits = commits
            .iter()
            .filter(|c| c.classification.as_deref() != Some(IGNORE))
            .filter_map(|c| Entry::from_commit(c, types))
            .collect();

        Self {
            tag,
            changes,
            commits,
            credits: credits.to_vec(),
        }
    }
}

/// Produces the changelog text.
pub trait ChangelogRenderer: Send + Sync {
    fn render(&self, context: &ChangelogContext) -> Result<String>;
}

/// Pluralizes the last word of `name` unless `count` is one.
pub fn plural(name: String, count: usize) -> String {
    if count == 1 {
        return name;
    }

    let last = name.rsplit(' ').next().unwrap_or_default().to_lowercase();
    const UNCOUNTABLE: &[&str] = &["misc", "info", "documentation", "feedback", "maintenance"];
    if last.is_empty() || UNCOUNTABLE.contains(&last.as_str()) {
        return name;
    }

    let upper = name.chars().all(|c| !c.is_lowercase());
    let suffix = if ["s", "x", "z", "ch", "sh"].iter().any(|end| last.ends_with(end)) {
        "es"
    } else if last.ends_with('y')
        && !last
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| "aeiou".contains(c))
    {
        let stem = &name[..name.len() - 1];
        return format!("{}{}", stem, if upper { "IES" } else { "ies" });
    } else {
        "s"
    };

    if upper {
        format!("{}{}", name, suffix.to_uppercase())
    } else {
        format!("{}{}", name, suffix)
    }
}

/// First seven characters of a hash.
pub fn short_hash(hash: String) -> String {
    hash.chars().take(7).collect()
}

/// `@a`, `@a and @b`, `@a, @b and @c`.
pub fn mentions(logins: Vec<String>) -> String {
    let names: Vec<String> = logins.iter().map(|login| format!("@{}", login)).collect();
    match names.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
    }
}

/// [`ChangelogRenderer`] backed by a minijinja template.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    source: Option<String>,
    flat: bool,
}

impl TemplateRenderer {
    /// Renders grouped changes with the built-in template.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders a flat commit list.
    pub fn flat() -> Self {
        Self {
            source: None,
            flat: true,
        }
    }

    /// Uses a custom template source.
    pub fn with_template(mut self, source: impl Into<String>) -> Self {
        let source = source.into();
        self.source = (!source.trim().is_empty()).then_some(source);
        self
    }

    fn environment() -> Environment<'static> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("plural", plural);
        env.add_filter("short_hash", short_hash);
        env.add_filter("mentions", mentions);
        env
    }
}

impl ChangelogRenderer for TemplateRenderer {
    fn render(&self, context: &ChangelogContext) -> Result<String> {
        if self.flat {
            if context.commits.is_empty() {
                return Ok(INITIAL_RELEASE.to_string());
            }
        } else if context.changes.is_empty() {
            return Err(Error::precondition(
                "No changes happened since the last release.",
            ));
        }

        let source = match (&self.source, self.flat) {
            (Some(source), _) => source.as_str(),
            (None, true) => FLAT_TEMPLATE,
            (None, false) => DEFAULT_TEMPLATE,
        };

        let rendered = Self::environment()
            .render_str(source, context)
            .map_err(|e| Error::Template(e.to_string()))?;
        let rendered = rendered.trim().to_string();

        if rendered.is_empty() {
            if self.flat {
                return Ok(INITIAL_RELEASE.to_string());
            }
            return Err(Error::Template("the template produced an empty changelog".to_string()));
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::{default_change_types, group_by_type};
    use crate::commit::Person;

    fn commit(hash: &str, title: &str, handle: &str) -> Commit {
        Commit::new(hash, title, "", Person::new("Ada", "ada@example.com")).classified(handle)
    }

    fn context(commits: &[Commit], credits: &[&str]) -> ChangelogContext {
        let types = default_change_types();
        let groups = group_by_type(commits, &types);
        let credits: Vec<String> = credits.iter().map(|c| c.to_string()).collect();
        ChangelogContext::new(Some("v1.0.1".to_string()), commits, &groups, &credits, &types)
    }

    #[test]
    fn grouped_changelog_has_headings_in_category_order() {
        let commits = [
            commit("1111111aaaa", "fix the thing", "patch"),
            commit("2222222bbbb", "Drop v1 (major)", "major"),
            commit("3333333cccc", "add option (#42)", "minor"),
            commit("4444444dddd", "another fix", "patch"),
        ];

        let out = TemplateRenderer::new()
            .render(&context(&commits, &["alice", "bob", "carol"]))
            .unwrap();

        assert_eq!(
            out,
            "### Major Change\n\n- Drop v1 #2222222\n\n\
             ### Minor Change\n\n- Add option (#42) #3333333\n\n\
             ### Patches\n\n- Fix the thing #1111111\n- Another fix #4444444\n\n\
             ### Credits\n\nHuge thanks to @alice, @bob and @carol for contributing!"
        );
    }

    #[test]
    fn empty_changes_are_rejected() {
        let err = TemplateRenderer::new().render(&context(&[], &[])).unwrap_err();
        assert!(err.to_string().contains("No changes happened"));
    }

    #[test]
    fn flat_mode_lists_commits_and_falls_back() {
        let commits = [
            commit("1111111aaaa", "first", "patch"),
            commit("2222222bbbb", "skip me", IGNORE),
        ];
        let out = TemplateRenderer::flat().render(&context(&commits, &[])).unwrap();
        assert_eq!(out, "- First #1111111");

        let out = TemplateRenderer::flat().render(&context(&[], &[])).unwrap();
        assert_eq!(out, INITIAL_RELEASE);
    }

    #[test]
    fn custom_template_sees_the_context() {
        let commits = [commit("1111111aaaa", "first", "patch")];
        let out = TemplateRenderer::new()
            .with_template("{{ tag }}: {{ changes|length }} section(s)")
            .render(&context(&commits, &[]))
            .unwrap();
        assert_eq!(out, "v1.0.1: 1 section(s)");
    }

    #[test]
    fn broken_template_is_a_template_error() {
        let commits = [commit("1111111aaaa", "first", "patch")];
        let err = TemplateRenderer::new()
            .with_template("{% for %}")
            .render(&context(&commits, &[]))
            .unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn plural_rules() {
        assert_eq!(plural("Patch".to_string(), 2), "Patches");
        assert_eq!(plural("Patch".to_string(), 1), "Patch");
        assert_eq!(plural("Minor Change".to_string(), 0), "Minor Changes");
        assert_eq!(plural("Dependency".to_string(), 3), "Dependencies");
        assert_eq!(plural("Misc".to_string(), 3), "Misc");
    }

    #[test]
    fn mentions_join_with_and() {
        assert_eq!(mentions(vec![]), "");
        assert_eq!(mentions(vec!["a".into()]), "@a");
        assert_eq!(mentions(vec!["a".into(), "b".into()]), "@a and @b");
    }
}

//! Static catalog of plugin categories.

use crate::theme::Theme;

/// A category and a few example plugins in it.
pub(crate) struct Category {
    pub(crate) id: &'static str,
    pub(crate) title: &'static str,
    pub(crate) description: &'static str,
    pub(crate) examples: &'static [&'static str],
}

pub(crate) const CATEGORIES: &[Category] = &[
    Category {
        id: "ai",
        title: "AI",
        description: "Agents, model engines and prompt tooling",
        examples: &["@strand/plugin-agents", "@strand/plugin-models"],
    },
    Category {
        id: "devtools",
        title: "Developer tools",
        description: "Scaffolding, templates and local workflows",
        examples: &["@strand/plugin-templates", "@strand/plugin-deploy"],
    },
    Category {
        id: "data",
        title: "Data",
        description: "Connectors, SDKs and data pipelines",
        examples: &["@strand/plugin-sql", "@strand/plugin-sdk"],
    },
];

pub(crate) fn run() {
    println!("{}", Theme::header("Plugin Categories"));
    println!("{}", Theme::separator());
    for c in CATEGORIES {
        println!("  {:<10} {}", c.id, c.title);
        println!("  {:<10} {}", "", Theme::dimmed(c.description));
        println!("  {:<10} {}", "", Theme::list(c.examples));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_ids_are_unique() {
        let mut ids: Vec<_> = CATEGORIES.iter().map(|c| c.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), CATEGORIES.len());
    }
}

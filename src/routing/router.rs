// Router - static table from query category to the agent that handles it

use super::types::{AgentConfig, Category};
use std::collections::HashMap;

/// Category → agent lookup. `Unknown` always resolves to the fallback agent.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<Category, AgentConfig>,
}

impl RouteTable {
    pub fn new(mut routes: HashMap<Category, AgentConfig>, fallback: AgentConfig) -> Self {
        routes.insert(Category::Unknown, fallback);
        Self { routes }
    }

    /// Routing used by the reference deployment: a coder model for code,
    /// a reasoning model for analysis and a general model for the rest.
    pub fn reference() -> Self {
        let mut routes = HashMap::new();
        routes.insert(
            Category::Code,
            AgentConfig::new("Software Engineer", "qwen2.5-coder:3b")
                .with_description("Technical implementation specialist")
                .with_instruction("Follow the standard style guide for the target language")
                .with_instruction("Include error handling and edge case consideration")
                .with_instruction("Provide time/space complexity analysis"),
        );
        routes.insert(
            Category::Reason,
            AgentConfig::new("Analytical Strategist", "exaone-deep:2.4b")
                .with_description("Complex problem solving expert")
                .with_instruction("Break problems into first principles")
                .with_instruction("Validate assumptions through multiple approaches")
                .with_instruction("Quantify uncertainty in conclusions"),
        );
        routes.insert(Category::Language, AgentConfig::new("Assistant", "qwen2.5:3b"));
        routes.insert(
            Category::Search,
            AgentConfig::new("Research Analyst", "qwen2.5:3b")
                .with_description("Information retrieval specialist")
                .with_instruction("Include publication dates and context timeliness")
                .with_datetime(),
        );

        Self::new(routes, AgentConfig::new("General Assistant", "qwen2.5:3b"))
    }

    /// Look up the agent for a category
    pub fn route(&self, category: Category) -> Result<&AgentConfig, RoutingError> {
        self.routes
            .get(&category)
            .ok_or(RoutingError::Unroutable(category))
    }

    /// The agent that handles `Unknown`
    pub fn fallback(&self) -> &AgentConfig {
        // Installed by `new` and never removed
        &self.routes[&Category::Unknown]
    }

    /// Check that every listed category has an entry
    pub fn ensure_covers(&self, categories: &[Category]) -> Result<(), RoutingError> {
        categories
            .iter()
            .chain(std::iter::once(&Category::Unknown))
            .try_for_each(|category| self.route(*category).map(|_| ()))
    }

    /// Entries in category order
    pub fn entries(&self) -> Vec<(Category, &AgentConfig)> {
        let mut entries: Vec<_> = self.routes.iter().map(|(c, a)| (*c, a)).collect();
        entries.sort_by_key(|(c, _)| *c);
        entries
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::reference()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    #[error("No route configured for category `{0}`")]
    Unroutable(Category),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_table_is_total() {
        let table = RouteTable::reference();
        for category in Category::ALL {
            assert!(table.route(category).is_ok(), "no route for {category}");
        }
        assert!(table.ensure_covers(&Category::ALL).is_ok());
    }

    #[test]
    fn test_reference_models() {
        let table = RouteTable::reference();
        assert_eq!(table.route(Category::Code).unwrap().model, "qwen2.5-coder:3b");
        assert_eq!(table.route(Category::Reason).unwrap().model, "exaone-deep:2.4b");
        assert_eq!(table.route(Category::Language).unwrap().model, "qwen2.5:3b");
        assert_eq!(table.route(Category::Unknown).unwrap(), table.fallback());
    }

    #[test]
    fn test_unknown_always_routes_to_fallback() {
        let fallback = AgentConfig::new("fallback", "llama3.2");
        let table = RouteTable::new(HashMap::new(), fallback.clone());
        assert_eq!(table.route(Category::Unknown).unwrap(), &fallback);

        // An explicit `unknown` entry is replaced by the fallback
        let mut routes = HashMap::new();
        routes.insert(Category::Unknown, AgentConfig::new("other", "other"));
        let table = RouteTable::new(routes, fallback.clone());
        assert_eq!(table.fallback(), &fallback);
    }

    #[test]
    fn test_missing_entry_is_unroutable() {
        let mut routes = HashMap::new();
        routes.insert(Category::Code, AgentConfig::new("coder", "qwen2.5-coder:3b"));
        let table = RouteTable::new(routes, AgentConfig::new("fallback", "qwen2.5:3b"));

        assert_eq!(
            table.route(Category::Reason).unwrap_err(),
            RoutingError::Unroutable(Category::Reason)
        );
        assert!(table.ensure_covers(&[Category::Code]).is_ok());
        assert_eq!(
            table.ensure_covers(&[Category::Code, Category::Language]).unwrap_err(),
            RoutingError::Unroutable(Category::Language)
        );
    }

    #[test]
    fn test_route_is_pure() {
        let table = RouteTable::reference();
        let first = table.route(Category::Code).unwrap().clone();
        let second = table.route(Category::Code).unwrap();
        assert_eq!(&first, second);
    }

    #[test]
    fn test_entries_sorted_by_category() {
        let table = RouteTable::reference();
        let categories: Vec<Category> = table.entries().into_iter().map(|(c, _)| c).collect();
        assert_eq!(categories, Category::ALL.to_vec());
    }
}

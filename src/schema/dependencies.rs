use super::types::SourceTable;
use crate::error::ImportError;
use std::collections::{HashMap, HashSet};

/// Resolves the order in which source tables must be loaded
pub struct DependencyResolver<'a> {
    sources: Vec<&'a SourceTable>,
    /// Map of table name -> tables it depends on
    deps: HashMap<&'static str, HashSet<&'static str>>,
}

impl<'a> DependencyResolver<'a> {
    /// Build the dependency graph. Every dependent table depends on the
    /// single primary table; the primary depends on nothing.
    pub fn new(sources: &[&'a SourceTable]) -> Result<Self, ImportError> {
        let primary = primary_source(sources)?;

        let mut deps: HashMap<&'static str, HashSet<&'static str>> = HashMap::new();
        for source in sources {
            let parents = deps.entry(source.name).or_default();
            if !source.is_primary() {
                parents.insert(primary.name);
            }
        }

        Ok(Self {
            sources: sources.to_vec(),
            deps,
        })
    }

    /// Return all tables in load order (parents before children). Tables
    /// with no ordering constraint keep their configured order.
    pub fn load_order(&self) -> Result<Vec<&'a SourceTable>, ImportError> {
        let mut result = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut temp_visited: HashSet<&str> = HashSet::new();

        for source in &self.sources {
            if !visited.contains(source.name) {
                self.visit(source.name, &mut visited, &mut temp_visited, &mut result)?;
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        name: &'static str,
        visited: &mut HashSet<&'static str>,
        temp_visited: &mut HashSet<&'static str>,
        result: &mut Vec<&'a SourceTable>,
    ) -> Result<(), ImportError> {
        if temp_visited.contains(name) {
            return Err(ImportError::DependencyCycle {
                detail: format!("circular dependency at {}", name),
            });
        }
        if visited.contains(name) {
            return Ok(());
        }

        temp_visited.insert(name);

        if let Some(deps) = self.deps.get(name) {
            let mut deps: Vec<_> = deps.iter().copied().collect();
            deps.sort_unstable();
            for dep in deps {
                if dep != name {
                    self.visit(dep, visited, temp_visited, result)?;
                }
            }
        }

        temp_visited.remove(name);
        visited.insert(name);

        if let Some(source) = self.sources.iter().find(|s| s.name == name) {
            result.push(*source);
        }

        Ok(())
    }
}

/// The one source marked as primary-key table
pub fn primary_source<'a>(sources: &[&'a SourceTable]) -> Result<&'a SourceTable, ImportError> {
    let primaries: Vec<&'a SourceTable> = sources.iter().copied().filter(|s| s.is_primary()).collect();

    match primaries.as_slice() {
        [] => Err(ImportError::NoPrimaryTable),
        [primary] => Ok(*primary),
        many => Err(ImportError::MultiplePrimaryTables {
            tables: many.iter().map(|s| s.name).collect(),
        }),
    }
}

/// Resolve the load order for a set of sources: exactly one root, loaded first
pub fn resolve_load_order<'a>(sources: &[&'a SourceTable]) -> Result<Vec<&'a SourceTable>, ImportError> {
    DependencyResolver::new(sources)?.load_order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::sources::{ALL_SOURCES, CARS, CONSUMPTION, EMISSIONS};
    use crate::schema::types::TableRole;

    #[test]
    fn test_primary_loaded_first() {
        let order = resolve_load_order(&[&EMISSIONS, &CONSUMPTION, &CARS]).unwrap();
        let names: Vec<_> = order.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["cars", "emissions", "consumption"]);
    }

    #[test]
    fn test_configured_order_kept_for_dependents() {
        let order = resolve_load_order(ALL_SOURCES).unwrap();
        let names: Vec<_> = order.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["cars", "emissions", "consumption"]);
    }

    #[test]
    fn test_no_primary_error() {
        let result = resolve_load_order(&[&EMISSIONS, &CONSUMPTION]);
        assert!(matches!(result, Err(ImportError::NoPrimaryTable)));
    }

    #[test]
    fn test_multiple_primaries_error() {
        static SECOND_PRIMARY: SourceTable = SourceTable {
            name: "trucks",
            url: "https://example.invalid/trucks.txt",
            local_name: "trucks.txt",
            role: TableRole::Primary,
            requires_fk_precheck: false,
            normalization: &[],
        };

        let result = resolve_load_order(&[&CARS, &SECOND_PRIMARY]);
        match result {
            Err(ImportError::MultiplePrimaryTables { tables }) => {
                assert_eq!(tables, vec!["cars", "trucks"]);
            }
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut resolver = DependencyResolver::new(&[&CARS, &EMISSIONS]).unwrap();
        resolver.deps.entry("cars").or_default().insert("emissions");

        match resolver.load_order() {
            Err(ImportError::DependencyCycle { detail }) => assert!(detail.contains("circular")),
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }
}

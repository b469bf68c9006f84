//! Dependency ordering
//!
//! Orders a set of packages so that every package comes after the packages
//! it depends on. Dependencies that match nothing in the set are ignored.

use crate::dependency::Dependency;
use crate::error::{Error, Result};
use crate::package::PackageId;

/// Something that has an id and declares dependencies
pub trait DependencyInfo {
    fn id(&self) -> &PackageId;
    fn dependencies(&self) -> &[Dependency];
}

impl DependencyInfo for (PackageId, Vec<Dependency>) {
    fn id(&self) -> &PackageId {
        &self.0
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

struct Walk<'a, T> {
    items: &'a [T],
    marks: Vec<Mark>,
    order: Vec<usize>,
}

impl<T: DependencyInfo> Walk<'_, T> {
    fn visit(&mut self, idx: usize) -> Result<()> {
        let items = self.items;
        self.marks[idx] = Mark::InProgress;
        for dep in items[idx].dependencies() {
            for (candidate, item) in items.iter().enumerate() {
                if !dep.matches(item.id()) {
                    continue;
                }
                match self.marks[candidate] {
                    Mark::InProgress => {
                        return Err(Error::CyclicDependency(item.id().clone()));
                    }
                    Mark::Unvisited => self.visit(candidate)?,
                    Mark::Done => {}
                }
            }
        }
        self.marks[idx] = Mark::Done;
        self.order.push(idx);
        Ok(())
    }
}

fn resolve_indices<T: DependencyInfo>(items: &[T]) -> Result<Vec<usize>> {
    let mut walk = Walk {
        items,
        marks: vec![Mark::Unvisited; items.len()],
        order: Vec::with_capacity(items.len()),
    };
    for idx in 0..items.len() {
        if walk.marks[idx] == Mark::Unvisited {
            walk.visit(idx)?;
        }
    }
    Ok(walk.order)
}

/// Order package ids dependencies first.
///
/// Packages without a dependency relation keep their input order. Fails
/// with [`Error::CyclicDependency`] if the dependencies form a cycle.
pub fn resolve(packages: &[(PackageId, Vec<Dependency>)]) -> Result<Vec<PackageId>> {
    let order = resolve_indices(packages)?;
    tracing::debug!("Resolved install order for {} packages", order.len());
    Ok(order.into_iter().map(|i| packages[i].0.clone()).collect())
}

/// Reorder arbitrary items dependencies first
pub fn sort<T: DependencyInfo>(items: Vec<T>) -> Result<Vec<T>> {
    let order = resolve_indices(&items)?;
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(id: &str, deps: &str) -> (PackageId, Vec<Dependency>) {
        (PackageId::parse(id).unwrap(), Dependency::parse_list(deps))
    }

    fn names(ids: &[PackageId]) -> Vec<&str> {
        ids.iter().map(|id| id.name()).collect()
    }

    #[test]
    fn test_dependencies_come_first() {
        let packages = vec![
            pkg("g:a:1.0", "g:b,g:c"),
            pkg("g:b:1.0", "g:c"),
            pkg("g:c:1.0", ""),
        ];
        let order = resolve(&packages).unwrap();
        assert_eq!(names(&order), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_independent_packages_keep_input_order() {
        let packages = vec![pkg("g:x", ""), pkg("g:a", "g:z"), pkg("g:y", ""), pkg("g:z", "")];
        let order = resolve(&packages).unwrap();
        assert_eq!(names(&order), vec!["x", "z", "a", "y"]);
    }

    #[test]
    fn test_cycle_is_detected() {
        let packages = vec![pkg("g:a:1.0", "g:b"), pkg("g:b:1.0", "g:a")];
        assert!(matches!(resolve(&packages), Err(Error::CyclicDependency(_))));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let packages = vec![pkg("g:a:1.0", "g:a")];
        assert!(matches!(resolve(&packages), Err(Error::CyclicDependency(_))));
    }

    #[test]
    fn test_unknown_dependencies_are_ignored() {
        let packages = vec![pkg("g:a:1.0", "other:thing:1.0,g:b"), pkg("g:b:1.0", "")];
        let order = resolve(&packages).unwrap();
        assert_eq!(names(&order), vec!["b", "a"]);
    }

    #[test]
    fn test_version_range_limits_matches() {
        // g:b:2.0 is outside the range, so a has no dependency in the set
        let packages = vec![pkg("g:a:1.0", "g:b:[1.0,2.0)"), pkg("g:b:2.0", "")];
        let order = resolve(&packages).unwrap();
        assert_eq!(names(&order), vec!["a", "b"]);
    }

    #[test]
    fn test_diamond() {
        let packages = vec![
            pkg("g:top", "g:left,g:right"),
            pkg("g:left", "g:base"),
            pkg("g:right", "g:base"),
            pkg("g:base", ""),
        ];
        let order = resolve(&packages).unwrap();
        assert_eq!(names(&order), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn test_sort_items() {
        let items = vec![pkg("g:a", "g:b"), pkg("g:b", "")];
        let sorted = sort(items).unwrap();
        assert_eq!(sorted[0].0.name(), "b");
        assert_eq!(sorted[1].0.name(), "a");
    }
}

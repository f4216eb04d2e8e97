//! Relation paths between types.

use crate::error::LifeError;
use crate::model::{RelationDescription, TypeRegistry};

/// Relations leading from a start type to a target, one per hop.
pub(crate) type RelationPath<'r> = Vec<&'r RelationDescription>;

/// Find the shortest relation path from `from_type` to `target`.
///
/// `target` names either a type or a role. A hop reaches it when the relation's other
/// type or other role equals it. Each type is visited at most once per path and paths
/// are at most `max_length` hops long.
///
/// # Errors
///
/// `LifeError::Ambiguous` when several shortest paths exist and
/// `LifeError::InvalidArgument` when there is none.
pub(crate) fn shortest_path<'r>(
    registry: &'r dyn TypeRegistry,
    from_type: &str,
    target: &str,
    max_length: usize,
) -> Result<RelationPath<'r>, LifeError> {
    let mut found: Vec<RelationPath<'r>> = Vec::new();
    let mut current: RelationPath<'r> = Vec::new();
    let mut visited = vec![from_type.to_string()];
    collect_paths(registry, from_type, target, max_length, &mut current, &mut visited, &mut found)?;

    let Some(shortest) = found.iter().map(Vec::len).min() else {
        return Err(LifeError::InvalidArgument(format!(
            "No relation path from '{from_type}' to '{target}' within {max_length} steps"
        )));
    };
    let mut candidates: Vec<RelationPath<'r>> = found.into_iter().filter(|p| p.len() == shortest).collect();
    if candidates.len() > 1 {
        let described: Vec<String> = candidates.iter().map(|p| describe(from_type, p)).collect();
        return Err(LifeError::Ambiguous(format!(
            "'{target}' is reachable from '{from_type}' by {} paths ({}); use the role name instead",
            candidates.len(),
            described.join("; ")
        )));
    }
    let path = candidates.remove(0);
    log::trace!("Resolved '{target}' as {}", describe(from_type, &path));
    Ok(path)
}

fn collect_paths<'r>(
    registry: &'r dyn TypeRegistry,
    type_name: &str,
    target: &str,
    max_length: usize,
    current: &mut RelationPath<'r>,
    visited: &mut Vec<String>,
    found: &mut Vec<RelationPath<'r>>,
) -> Result<(), LifeError> {
    if current.len() >= max_length {
        return Ok(());
    }
    for relation in &registry.get(type_name)?.relations {
        current.push(relation);
        if relation.other_type == target || relation.other_role == target {
            found.push(current.clone());
        } else if !visited.contains(&relation.other_type) {
            visited.push(relation.other_type.clone());
            collect_paths(registry, &relation.other_type, target, max_length, current, visited, found)?;
            visited.pop();
        }
        current.pop();
    }
    Ok(())
}

fn describe(from_type: &str, path: &[&RelationDescription]) -> String {
    let mut text = from_type.to_string();
    for relation in path {
        text.push_str(&format!(" -{}-> {}", relation.other_role, relation.other_type));
    }
    text
}

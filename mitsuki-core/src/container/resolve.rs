use std::collections::HashMap;

use crate::config::ConfigValue;
use crate::container::descriptor::{ComponentDescriptor, DependencyRequest};
use crate::container::ContainerError;

/// A dependency edge after matching against the active descriptor set.
#[derive(Debug, Clone)]
pub(crate) enum Edge {
    /// Component dependency; `target` is `None` for an optional dependency
    /// that matched nothing.
    Component {
        param: String,
        target: Option<String>,
    },
    /// Configuration value dependency, resolved at instantiation time.
    Value {
        param: String,
        key: String,
        default: Option<ConfigValue>,
    },
}

/// An active descriptor together with its matched dependency edges.
pub(crate) struct ActiveComponent {
    pub descriptor: ComponentDescriptor,
    pub edges: Vec<Edge>,
}

impl std::fmt::Debug for ActiveComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveComponent")
            .field("descriptor", &self.descriptor.name())
            .field("edges", &self.edges)
            .finish()
    }
}

/// The validated, topologically sorted component graph.
pub(crate) struct Resolution {
    pub components: HashMap<String, ActiveComponent>,
    /// Instantiation order (dependencies before dependents), covering
    /// singletons and prototypes alike.
    pub order: Vec<String>,
}

impl std::fmt::Debug for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("components", &self.components)
            .field("order", &self.order)
            .finish()
    }
}

/// Filter descriptors by profile, match every dependency, reject duplicate
/// names and cycles, and produce a topological instantiation order.
pub(crate) fn resolve_graph(
    descriptors: Vec<ComponentDescriptor>,
    profile: &str,
) -> Result<Resolution, ContainerError> {
    let active: Vec<ComponentDescriptor> = descriptors
        .into_iter()
        .filter(|d| d.active_for(profile))
        .collect();

    // Descriptor names must be unique within the active set.
    let mut index_by_name: HashMap<&str, usize> = HashMap::new();
    for (i, d) in active.iter().enumerate() {
        if index_by_name.insert(d.name.as_str(), i).is_some() {
            return Err(ContainerError::DuplicateName {
                name: d.name.clone(),
                profile: profile.to_string(),
            });
        }
    }

    // Match each declared dependency to a unique active descriptor:
    // explicit name hint, then name == parameter, then unique type match.
    let mut edges: Vec<Vec<Edge>> = Vec::with_capacity(active.len());
    for d in &active {
        let mut matched = Vec::with_capacity(d.dependencies.len());
        for dep in &d.dependencies {
            matched.push(match_dependency(d, dep, &active, &index_by_name)?);
        }
        edges.push(matched);
    }

    let order = topological_order(&active, &edges, &index_by_name)?;

    let components = active
        .into_iter()
        .zip(edges)
        .map(|(descriptor, edges)| {
            (
                descriptor.name.clone(),
                ActiveComponent { descriptor, edges },
            )
        })
        .collect();

    Ok(Resolution { components, order })
}

fn match_dependency(
    owner: &ComponentDescriptor,
    dep: &DependencyRequest,
    active: &[ComponentDescriptor],
    index_by_name: &HashMap<&str, usize>,
) -> Result<Edge, ContainerError> {
    let (param, type_id, type_name, name_hint, optional) = match dep {
        DependencyRequest::Value {
            param,
            key,
            default,
        } => {
            return Ok(Edge::Value {
                param: param.clone(),
                key: key.clone(),
                default: default.clone(),
            });
        }
        DependencyRequest::Component {
            param,
            type_id,
            type_name,
            name_hint,
            optional,
        } => (param, *type_id, *type_name, name_hint, *optional),
    };

    // 1. Explicit name override.
    if let Some(hint) = name_hint {
        return match index_by_name.get(hint.as_str()) {
            Some(_) => Ok(Edge::Component {
                param: param.clone(),
                target: Some(hint.clone()),
            }),
            None if optional => Ok(Edge::Component {
                param: param.clone(),
                target: None,
            }),
            None => Err(ContainerError::MissingDependency {
                component: owner.name.clone(),
                dependency: format!("{param} (named '{hint}')"),
            }),
        };
    }

    // 2. A descriptor named exactly like the parameter.
    if index_by_name.contains_key(param.as_str()) {
        return Ok(Edge::Component {
            param: param.clone(),
            target: Some(param.clone()),
        });
    }

    // 3. Unique match on the declared type.
    let candidates: Vec<&ComponentDescriptor> = active
        .iter()
        .filter(|d| d.type_id == type_id)
        .collect();
    match candidates.len() {
        1 => Ok(Edge::Component {
            param: param.clone(),
            target: Some(candidates[0].name.clone()),
        }),
        0 if optional => Ok(Edge::Component {
            param: param.clone(),
            target: None,
        }),
        0 => Err(ContainerError::MissingDependency {
            component: owner.name.clone(),
            dependency: format!("{param}: {type_name}"),
        }),
        _ => Err(ContainerError::AmbiguousDependency {
            component: owner.name.clone(),
            dependency: format!("{param}: {type_name}"),
            candidates: candidates.iter().map(|d| d.name.clone()).collect(),
        }),
    }
}

/// Depth-first topological sort. On a back edge, the error names the full
/// cycle path (`A -> B -> A`).
fn topological_order(
    active: &[ComponentDescriptor],
    edges: &[Vec<Edge>],
    index_by_name: &HashMap<&str, usize>,
) -> Result<Vec<String>, ContainerError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    fn visit(
        idx: usize,
        active: &[ComponentDescriptor],
        edges: &[Vec<Edge>],
        index_by_name: &HashMap<&str, usize>,
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<String>,
    ) -> Result<(), ContainerError> {
        match marks[idx] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                let start = path.iter().position(|&p| p == idx).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&p| active[p].name.clone())
                    .collect();
                cycle.push(active[idx].name.clone());
                return Err(ContainerError::CircularDependency { cycle });
            }
            Mark::Unvisited => {}
        }

        marks[idx] = Mark::InProgress;
        path.push(idx);
        for edge in &edges[idx] {
            if let Edge::Component {
                target: Some(target),
                ..
            } = edge
            {
                let dep_idx = index_by_name[target.as_str()];
                visit(dep_idx, active, edges, index_by_name, marks, path, order)?;
            }
        }
        path.pop();
        marks[idx] = Mark::Done;
        order.push(active[idx].name.clone());
        Ok(())
    }

    let mut marks = vec![Mark::Unvisited; active.len()];
    let mut order = Vec::with_capacity(active.len());
    let mut path = Vec::new();
    for idx in 0..active.len() {
        visit(
            idx,
            active,
            edges,
            index_by_name,
            &mut marks,
            &mut path,
            &mut order,
        )?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::descriptor::DependencyRequest;

    #[derive(Clone)]
    struct A;
    #[derive(Clone)]
    struct B;
    #[derive(Clone)]
    struct C;

    fn simple<T: Clone + Send + Sync + 'static + Default>(
        name: &str,
        deps: Vec<DependencyRequest>,
    ) -> ComponentDescriptor {
        let mut builder = ComponentDescriptor::builder::<T>(name);
        for dep in deps {
            builder = builder.dependency(dep);
        }
        builder.build_with(|_| Ok(T::default()))
    }

    impl Default for A {
        fn default() -> Self {
            A
        }
    }
    impl Default for B {
        fn default() -> Self {
            B
        }
    }
    impl Default for C {
        fn default() -> Self {
            C
        }
    }

    #[test]
    fn dependencies_sort_before_dependents() {
        let descriptors = vec![
            simple::<C>("C", vec![DependencyRequest::component::<B>("b")]),
            simple::<B>("B", vec![DependencyRequest::component::<A>("a")]),
            simple::<A>("A", vec![]),
        ];
        let resolution = resolve_graph(descriptors, "").unwrap();
        let pos = |n: &str| resolution.order.iter().position(|x| x == n).unwrap();
        assert!(pos("A") < pos("B"));
        assert!(pos("B") < pos("C"));
    }

    #[test]
    fn cycle_names_the_full_path() {
        let descriptors = vec![
            simple::<A>("A", vec![DependencyRequest::component::<B>("b")]),
            simple::<B>("B", vec![DependencyRequest::component::<A>("a")]),
        ];
        let err = resolve_graph(descriptors, "").unwrap_err();
        match err {
            ContainerError::CircularDependency { cycle } => {
                assert!(cycle.contains(&"A".to_string()));
                assert!(cycle.contains(&"B".to_string()));
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected CircularDependency, got {other}"),
        }
    }

    #[test]
    fn duplicate_name_in_same_profile_rejected() {
        let descriptors = vec![simple::<A>("X", vec![]), simple::<B>("X", vec![])];
        let err = resolve_graph(descriptors, "").unwrap_err();
        assert!(matches!(err, ContainerError::DuplicateName { name, .. } if name == "X"));
    }

    #[test]
    fn same_name_in_disjoint_profiles_is_fine() {
        let d1 = ComponentDescriptor::builder::<A>("X")
            .profiles(["dev"])
            .build_with(|_| Ok(A));
        let d2 = ComponentDescriptor::builder::<B>("X")
            .profiles(["prod"])
            .build_with(|_| Ok(B));
        let resolution = resolve_graph(vec![d1, d2], "dev").unwrap();
        assert_eq!(resolution.order, vec!["X".to_string()]);
        assert_eq!(resolution.components["X"].descriptor.type_name(), "A");
    }

    #[test]
    fn ambiguous_type_match_reports_candidates() {
        let d1 = ComponentDescriptor::builder::<A>("first").build_with(|_| Ok(A));
        let d2 = ComponentDescriptor::builder::<A>("second").build_with(|_| Ok(A));
        let user = simple::<B>("user", vec![DependencyRequest::component::<A>("a")]);
        let err = resolve_graph(vec![d1, d2, user], "").unwrap_err();
        match err {
            ContainerError::AmbiguousDependency { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected AmbiguousDependency, got {other}"),
        }
    }

    #[test]
    fn name_hint_beats_type_ambiguity() {
        let d1 = ComponentDescriptor::builder::<A>("first").build_with(|_| Ok(A));
        let d2 = ComponentDescriptor::builder::<A>("second").build_with(|_| Ok(A));
        let user = simple::<B>("user", vec![DependencyRequest::named::<A>("a", "second")]);
        let resolution = resolve_graph(vec![d1, d2, user], "").unwrap();
        match &resolution.components["user"].edges[0] {
            Edge::Component { target, .. } => assert_eq!(target.as_deref(), Some("second")),
            other => panic!("unexpected edge {other:?}"),
        }
    }

    #[test]
    fn param_name_match_beats_type_match() {
        let d1 = ComponentDescriptor::builder::<A>("first").build_with(|_| Ok(A));
        let d2 = ComponentDescriptor::builder::<A>("second").build_with(|_| Ok(A));
        // Parameter named exactly like a descriptor resolves by name even
        // though the type match alone would be ambiguous.
        let user = simple::<B>("user", vec![DependencyRequest::component::<A>("first")]);
        let resolution = resolve_graph(vec![d1, d2, user], "").unwrap();
        match &resolution.components["user"].edges[0] {
            Edge::Component { target, .. } => assert_eq!(target.as_deref(), Some("first")),
            other => panic!("unexpected edge {other:?}"),
        }
    }

    #[test]
    fn optional_unmatched_dependency_is_tolerated() {
        let user = simple::<B>("user", vec![DependencyRequest::optional::<A>("a")]);
        let resolution = resolve_graph(vec![user], "").unwrap();
        match &resolution.components["user"].edges[0] {
            Edge::Component { target, .. } => assert!(target.is_none()),
            other => panic!("unexpected edge {other:?}"),
        }
    }

    #[test]
    fn missing_required_dependency_errors() {
        let user = simple::<B>("user", vec![DependencyRequest::component::<A>("a")]);
        let err = resolve_graph(vec![user], "").unwrap_err();
        assert!(matches!(err, ContainerError::MissingDependency { .. }));
    }

    #[test]
    fn profile_filter_excludes_inactive() {
        let d1 = ComponentDescriptor::builder::<A>("devOnly")
            .profiles(["dev"])
            .build_with(|_| Ok(A));
        let d2 = simple::<B>("everywhere", vec![]);
        let resolution = resolve_graph(vec![d1, d2], "prod").unwrap();
        assert_eq!(resolution.order, vec!["everywhere".to_string()]);
    }
}

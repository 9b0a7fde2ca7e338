use crate::name::{catalog_key, temporary, truncate};

/// A rename of one object inside one naming scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rename<K> {
    pub(crate) key: K,
    pub(crate) from: String,
    pub(crate) to: String,
}

impl<K> Rename<K> {
    pub(crate) fn new(key: K, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            key,
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Orders simultaneous renames so that no step targets a name still in use.
///
/// A rename runs as soon as no other pending rename still holds its target.
/// When every pending rename is blocked the remaining ones form cycles; one
/// member of a cycle then moves to a temporary name, which frees the slot the
/// rest of the cycle needs. A rotation of `n` names thus takes `n + 1` steps.
///
/// `is_taken` reports names held by objects outside the rename set.
pub(crate) fn solve_renames<K: Clone>(
    renames: Vec<Rename<K>>,
    max_length: usize,
    is_taken: impl Fn(&str) -> bool,
) -> Vec<Rename<K>> {
    let mut pending: Vec<Rename<K>> = renames
        .into_iter()
        .filter(|r| r.from != r.to)
        .collect();
    let mut steps = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let ready = (0..pending.len()).find(|&i| {
            let target = catalog_key(&pending[i].to);
            pending
                .iter()
                .enumerate()
                .all(|(j, other)| j == i || catalog_key(&other.from) != target)
        });

        match ready {
            Some(i) => steps.push(pending.remove(i)),
            None => {
                let in_use: Vec<String> = steps
                    .iter()
                    .map(|s| catalog_key(&s.to))
                    .chain(pending.iter().map(|p| catalog_key(&p.to)))
                    .collect();
                let blocked = &mut pending[0];
                let base = truncate(blocked.from.clone(), max_length.saturating_sub(9));
                let temp = temporary(&base, |candidate| {
                    !is_taken(candidate) && !in_use.contains(&catalog_key(candidate))
                });
                steps.push(Rename::new(blocked.key.clone(), blocked.from.clone(), temp.clone()));
                blocked.from = temp;
            }
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(renames: &[(&str, &str)]) -> Vec<Rename<usize>> {
        let input = renames
            .iter()
            .enumerate()
            .map(|(i, (from, to))| Rename::new(i, *from, *to))
            .collect();
        solve_renames(input, 64, |_| false)
    }

    fn apply(names: &mut Vec<String>, steps: &[Rename<usize>]) {
        for step in steps {
            assert!(
                !names.iter().any(|n| n.eq_ignore_ascii_case(&step.to)),
                "{} already taken",
                step.to
            );
            let slot = names.iter().position(|n| *n == step.from).unwrap();
            names[slot] = step.to.clone();
        }
    }

    #[test]
    fn test_chain_needs_no_temporary() {
        let steps = run(&[("a", "b"), ("b", "c")]);
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].from, "b");
        let mut names = vec!["a".to_string(), "b".to_string()];
        apply(&mut names, &steps);
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_rotation_uses_one_temporary() {
        let steps = run(&[("a", "b"), ("b", "c"), ("c", "a")]);
        assert_eq!(steps.len(), 4);
        let temporaries: Vec<_> = steps
            .iter()
            .filter(|s| !["a", "b", "c"].contains(&s.to.as_str()))
            .collect();
        assert_eq!(temporaries.len(), 1);
        assert!(temporaries[0].to.starts_with("a_"));

        let mut names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        apply(&mut names, &steps);
        assert_eq!(names, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_swap() {
        let steps = run(&[("x", "y"), ("y", "x")]);
        assert_eq!(steps.len(), 3);
        let mut names = vec!["x".to_string(), "y".to_string()];
        apply(&mut names, &steps);
        assert_eq!(names, vec!["y", "x"]);
    }

    #[test]
    fn test_case_only_rename_is_not_blocked_by_itself() {
        let steps = run(&[("name", "Name")]);
        assert_eq!(steps.len(), 1);
    }
}

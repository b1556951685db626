use crate::error::SizingError;

/// One named list of candidate values.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis<V> {
    pub name: String,
    pub values: Vec<V>,
}

impl<V> Axis<V> {
    pub fn new(name: impl Into<String>, values: Vec<V>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// One value picked per axis, in axis order.
#[derive(Debug, Clone, PartialEq)]
pub struct Combination<V>(Vec<(String, V)>);

impl<V> Combination<V> {
    pub fn get(&self, name: &str) -> Option<&V> {
        self.0
            .iter()
            .find(|(axis, _)| axis == name)
            .map(|(_, value)| value)
    }

    pub fn into_pairs(self) -> Vec<(String, V)> {
        self.0
    }
}

/// Cartesian product of `axes`.
///
/// The first axis varies slowest and values keep their declared order, so the
/// output order is a pure function of the input order. An empty axis yields no
/// combinations.
pub fn product<V: Clone>(axes: &[Axis<V>]) -> Vec<Combination<V>> {
    if axes.is_empty() {
        return Vec::new();
    }

    let mut combinations: Vec<Vec<(String, V)>> = vec![Vec::new()];
    for axis in axes {
        let mut next = Vec::with_capacity(combinations.len() * axis.values.len());
        for prefix in &combinations {
            for value in &axis.values {
                let mut combination = prefix.clone();
                combination.push((axis.name.clone(), value.clone()));
                next.push(combination);
            }
        }
        combinations = next;
    }

    combinations.into_iter().map(Combination).collect()
}

/// Like [`product`], but an empty axis set or empty axis is an input error.
pub fn expand<V: Clone>(axes: &[Axis<V>]) -> Result<Vec<Combination<V>>, SizingError> {
    if axes.is_empty() {
        return Err(SizingError::EmptyAxis("<none>".to_string()));
    }
    if let Some(empty) = axes.iter().find(|axis| axis.values.is_empty()) {
        return Err(SizingError::EmptyAxis(empty.name.clone()));
    }

    Ok(product(axes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_varies_last_axis_fastest() {
        let axes = vec![
            Axis::new("a", vec!["1", "2"]),
            Axis::new("b", vec!["x", "y"]),
        ];

        let rendered = product(&axes)
            .into_iter()
            .map(|combination| {
                combination
                    .into_pairs()
                    .into_iter()
                    .map(|(axis, value)| format!("{axis}:{value}"))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>();

        assert_eq!(rendered, vec!["a:1,b:x", "a:1,b:y", "a:2,b:x", "a:2,b:y"]);
    }

    #[test]
    fn product_of_empty_axis_is_empty() {
        let axes = vec![Axis::new("a", vec![1, 2]), Axis::new("b", Vec::new())];
        assert!(product(&axes).is_empty());
    }

    #[test]
    fn expand_rejects_empty_axis() {
        let axes = vec![Axis::new("a", vec![1, 2]), Axis::new("b", Vec::<i32>::new())];
        let err = expand(&axes).expect_err("empty axis must be rejected");
        assert!(matches!(err, SizingError::EmptyAxis(name) if name == "b"));
    }

    #[test]
    fn combination_lookup_by_axis_name() {
        let axes = vec![Axis::new("power", vec![0.8]), Axis::new("effect_size", vec![0.01, 0.02])];
        let combinations = expand(&axes).expect("non-empty axes");
        assert_eq!(combinations.len(), 2);
        assert_eq!(combinations[1].get("effect_size"), Some(&0.02));
        assert_eq!(combinations[1].get("missing"), None);
    }
}

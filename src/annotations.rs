use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// A detected point in video pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub x: f64,
    pub y: f64,
    pub label: Option<String>,
}

#[cfg(test)]
impl Annotation {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, label: None }
    }
}

/// Named reference corners. An entry may be present with no point.
pub type CornerSet = BTreeMap<String, Option<Annotation>>;

/// Canonical result of one analyzed frame. Replaced wholesale on every
/// successful response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSet {
    pub positions: Vec<Annotation>,
    pub corners: CornerSet,
}

impl AnnotationSet {
    pub fn present_corners(&self) -> impl Iterator<Item = (&str, &Annotation)> {
        self.corners
            .iter()
            .filter_map(|(name, point)| point.as_ref().map(|p| (name.as_str(), p)))
    }
}

// Accepted response bodies. The Analysis service has shipped each of these
// at some point, so all of them stay.
#[derive(Deserialize)]
#[serde(untagged)]
enum ResponseShape {
    /// `[[x, y], {"x": .., "y": ..}, ...]`
    Bare(Vec<Value>),
    /// `{"notes": [...], "corners": {"name": point | null, ...}}`
    Wrapped {
        notes: Vec<Value>,
        #[serde(default)]
        corners: Value,
    },
}

// Accepted point encodings.
#[derive(Deserialize)]
#[serde(untagged)]
enum PointShape {
    /// `[x, y]`
    Pair(f64, f64),
    /// `{"x": .., "y": ..}` or `{"X": .., "Y": ..}`
    Object {
        #[serde(alias = "X")]
        x: f64,
        #[serde(alias = "Y")]
        y: f64,
        #[serde(default)]
        label: Option<String>,
    },
}

impl PointShape {
    fn into_annotation(self) -> Option<Annotation> {
        let (x, y, label) = match self {
            PointShape::Pair(x, y) => (x, y, None),
            PointShape::Object { x, y, label } => (x, y, label),
        };
        (x.is_finite() && y.is_finite()).then_some(Annotation { x, y, label })
    }
}

fn parse_point(value: &Value) -> Option<Annotation> {
    // Derived structs also deserialize from sequences; only pairs are points.
    if value.as_array().is_some_and(|items| items.len() != 2) {
        return None;
    }
    PointShape::deserialize(value).ok()?.into_annotation()
}

fn parse_positions(values: &[Value]) -> Vec<Annotation> {
    let positions: Vec<Annotation> = values.iter().filter_map(parse_point).collect();
    let dropped = values.len() - positions.len();
    if dropped > 0 {
        tracing::debug!("Dropped {} unresolvable position entries", dropped);
    }
    positions
}

fn parse_corners(value: &Value) -> CornerSet {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(name, point)| (name.clone(), parse_point(point)))
            .collect(),
        _ => CornerSet::new(),
    }
}

/// Reconcile a decoded Analysis response into the canonical annotation set.
///
/// Never fails: absent, null, or unrecognized bodies produce an empty set so
/// the renderer always has a valid input.
pub fn normalize(body: Option<&Value>) -> AnnotationSet {
    let Some(body) = body else {
        return AnnotationSet::default();
    };

    match ResponseShape::deserialize(body) {
        Ok(ResponseShape::Bare(values)) => AnnotationSet {
            positions: parse_positions(&values),
            corners: CornerSet::new(),
        },
        Ok(ResponseShape::Wrapped { notes, corners }) => AnnotationSet {
            positions: parse_positions(&notes),
            corners: parse_corners(&corners),
        },
        Err(_) => {
            if !body.is_null() {
                tracing::debug!("Unrecognized analysis response shape: {}", body);
            }
            AnnotationSet::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coords(set: &AnnotationSet) -> Vec<(f64, f64)> {
        set.positions.iter().map(|a| (a.x, a.y)).collect()
    }

    #[test]
    fn test_every_accepted_shape_yields_same_coordinates() {
        let expected = vec![(10.0, 20.0), (30.5, 40.0)];

        let bare_pairs = json!([[10, 20], [30.5, 40]]);
        let bare_objects = json!([{"x": 10, "y": 20}, {"X": 30.5, "Y": 40}]);
        let wrapped = json!({"notes": [[10, 20], {"x": 30.5, "y": 40}], "corners": {}});

        assert_eq!(coords(&normalize(Some(&bare_pairs))), expected);
        assert_eq!(coords(&normalize(Some(&bare_objects))), expected);
        assert_eq!(coords(&normalize(Some(&wrapped))), expected);
    }

    #[test]
    fn test_null_and_absent_bodies_are_empty() {
        assert_eq!(normalize(None), AnnotationSet::default());
        assert_eq!(normalize(Some(&Value::Null)), AnnotationSet::default());
    }

    #[test]
    fn test_unrecognized_shapes_are_empty() {
        let bodies = [
            json!("hello"),
            json!(42),
            json!(true),
            json!({}),
            json!({"error": "No fretboard corners detected."}),
            json!({"notes": "not a list", "corners": {"tl": [1, 2]}}),
            json!({"corners": {"tl": [1, 2]}}),
        ];

        for body in &bodies {
            assert_eq!(normalize(Some(body)), AnnotationSet::default(), "{}", body);
        }
    }

    #[test]
    fn test_bad_entries_are_dropped_not_fatal() {
        let body = json!([
            [1, 2],
            null,
            [1],
            [1, 2, 3],
            [1, 2, "index"],
            ["a", "b"],
            {"x": 5},
            {"x": "5", "y": 6},
            {"x": 7, "y": 8, "label": "index"},
        ]);

        let set = normalize(Some(&body));
        assert_eq!(set.positions.len(), 2);
        assert_eq!(set.positions[0], Annotation::new(1.0, 2.0));
        assert_eq!(set.positions[1].label.as_deref(), Some("index"));
    }

    #[test]
    fn test_mixed_case_keys_accepted() {
        let body = json!([{"x": 1, "Y": 2}, {"X": 3, "y": 4}]);
        assert_eq!(coords(&normalize(Some(&body))), vec![(1.0, 2.0), (3.0, 4.0)]);
    }

    #[test]
    fn test_corners_keep_absent_entries() {
        let body = json!({
            "notes": [],
            "corners": {
                "top_left": [0, 0],
                "top_right": {"X": 100, "Y": 0},
                "bottom_left": null,
                "bottom_right": "garbage",
            }
        });

        let set = normalize(Some(&body));
        assert!(set.positions.is_empty());
        assert_eq!(set.corners.len(), 4);
        assert_eq!(set.corners["bottom_left"], None);
        assert_eq!(set.corners["bottom_right"], None);

        let present: Vec<&str> = set.present_corners().map(|(name, _)| name).collect();
        assert_eq!(present, vec!["top_left", "top_right"]);
    }

    #[test]
    fn test_wrapped_without_corners_mapping() {
        let body = json!({"notes": [[3, 4]], "corners": [1, 2]});
        let set = normalize(Some(&body));
        assert_eq!(coords(&set), vec![(3.0, 4.0)]);
        assert!(set.corners.is_empty());

        let body = json!({"notes": [[3, 4]]});
        assert_eq!(coords(&normalize(Some(&body))), vec![(3.0, 4.0)]);
    }
}

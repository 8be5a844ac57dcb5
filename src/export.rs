//! Turning polygon selections on the scatter plot into a labels CSV.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const EXPORT_FILENAME: &str = "image_labels.csv";
pub const UNLABELED: &str = "unlabeled";

/// A named region drawn in the UI and the point ids it encloses.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Polygon {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub points: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelRow {
    pub filename: String,
    pub label: String,
}

/// One row per image, in point-id order. Polygons are applied in order, so
/// a point enclosed by several takes the last one's name. Ids that do not
/// name an image are ignored.
pub fn label_rows<P: AsRef<Path>>(paths: &[P], polygons: &[Polygon]) -> Vec<LabelRow> {
    let mut labels: HashMap<usize, &str> = HashMap::new();
    for polygon in polygons {
        let name = polygon.name.as_deref().unwrap_or(UNLABELED);
        for &id in &polygon.points {
            labels.insert(id, name);
        }
    }

    paths
        .iter()
        .enumerate()
        .map(|(id, path)| LabelRow {
            filename: path
                .as_ref()
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
            label: labels.get(&id).copied().unwrap_or(UNLABELED).to_string(),
        })
        .collect()
}

pub fn to_csv(rows: &[LabelRow]) -> String {
    let mut out = String::from("filename,label\n");
    for row in rows {
        out.push_str(&csv_field(&row.filename));
        out.push(',');
        out.push_str(&csv_field(&row.label));
        out.push('\n');
    }
    out
}

/// Quote a field only when it needs it, doubling embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

//! # Genetic Map Interpolation
//!
//! Loads a PLINK-format genetic map (`CHROM ID CM BP`, one anchor per line,
//! sorted by base position within each chromosome) and converts physical
//! positions to genetic distances by linear interpolation between anchors.
//!
//! Records outside a chromosome's anchor span cannot be interpolated; the
//! input layer drops them before analysis.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::data::marker::Markers;
use crate::error::{IbdclustError, Result};

/// Minimum cM distance between consecutive markers after interpolation.
/// Ties in the interpolated sequence are forced apart by this step.
pub const MIN_CM_DIST: f64 = 1e-6;

/// Anchors for a single chromosome
#[derive(Clone, Debug, Default)]
struct ChromAnchors {
    base_pos: Vec<i32>,
    cm: Vec<f64>,
}

/// A PLINK-format genetic map
#[derive(Clone, Debug, Default)]
pub struct PlinkGenMap {
    chroms: HashMap<String, ChromAnchors>,
}

impl PlinkGenMap {
    /// Load a genetic map from a PLINK map file.
    ///
    /// When `restrict_chrom` is given, only anchors for that chromosome are
    /// retained.
    pub fn from_file(path: &Path, restrict_chrom: Option<&str>) -> Result<Self> {
        let file = File::open(path).map_err(|_| IbdclustError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let is_gzipped = path
            .extension()
            .map(|e| e == "gz" || e == "bgz")
            .unwrap_or(false);
        let reader: Box<dyn Read> = if is_gzipped {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Self::from_reader(BufReader::new(reader), restrict_chrom)
    }

    pub(crate) fn from_reader(reader: impl BufRead, restrict_chrom: Option<&str>) -> Result<Self> {
        let mut chroms: HashMap<String, ChromAnchors> = HashMap::new();
        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let (chrom, _id, cm, bp) = match (
                fields.next(),
                fields.next(),
                fields.next(),
                fields.next(),
            ) {
                (Some(c), Some(i), Some(g), Some(b)) => (c, i, g, b),
                _ => {
                    return Err(IbdclustError::parse(
                        line_num + 1,
                        format!("expected 4 genetic map fields: {trimmed}"),
                    ))
                }
            };
            if let Some(restrict) = restrict_chrom {
                if chrom != restrict {
                    continue;
                }
            }
            let cm: f64 = cm.parse().map_err(|_| {
                IbdclustError::parse(line_num + 1, format!("invalid cM position: {cm}"))
            })?;
            let bp: i32 = bp.parse().map_err(|_| {
                IbdclustError::parse(line_num + 1, format!("invalid base position: {bp}"))
            })?;
            let anchors = chroms.entry(chrom.to_string()).or_default();
            if let Some(&last) = anchors.base_pos.last() {
                if bp <= last {
                    return Err(IbdclustError::map(format!(
                        "map positions not in increasing order on chromosome {chrom}: {last} then {bp}"
                    )));
                }
            }
            anchors.base_pos.push(bp);
            anchors.cm.push(cm);
        }
        if chroms.is_empty() {
            return Err(IbdclustError::map(match restrict_chrom {
                Some(c) => format!("no genetic map entries found for chromosome {c}"),
                None => "no genetic map entries found".to_string(),
            }));
        }
        Ok(Self { chroms })
    }

    /// Check whether the map has anchors for a chromosome
    pub fn has_chrom(&self, chrom: &str) -> bool {
        self.chroms.contains_key(chrom)
    }

    /// First and last anchor base positions for a chromosome
    pub fn span(&self, chrom: &str) -> Option<(i32, i32)> {
        self.chroms.get(chrom).and_then(|a| {
            match (a.base_pos.first(), a.base_pos.last()) {
                (Some(&first), Some(&last)) => Some((first, last)),
                _ => None,
            }
        })
    }

    /// Interpolated cM position of a base position inside the anchor span
    pub fn cm_pos(&self, chrom: &str, bp: i32) -> Result<f64> {
        let anchors = self.chroms.get(chrom).ok_or_else(|| {
            IbdclustError::map(format!("chromosome {chrom} not found in genetic map"))
        })?;
        if anchors.base_pos.len() < 2 {
            return Err(IbdclustError::map(format!(
                "fewer than 2 genetic map anchors for chromosome {chrom}"
            )));
        }
        match anchors.base_pos.binary_search(&bp) {
            Ok(idx) => Ok(anchors.cm[idx]),
            Err(ins) => {
                if ins == 0 || ins == anchors.base_pos.len() {
                    return Err(IbdclustError::map(format!(
                        "position {chrom}:{bp} is outside the genetic map span"
                    )));
                }
                let (a, b) = (ins - 1, ins);
                let x = bp as f64;
                let xa = anchors.base_pos[a] as f64;
                let xb = anchors.base_pos[b] as f64;
                let fa = anchors.cm[a];
                let fb = anchors.cm[b];
                Ok(fa + ((x - xa) / (xb - xa)) * (fb - fa))
            }
        }
    }

    /// Interpolated cM positions for each marker, forced strictly increasing.
    ///
    /// Consecutive equal or decreasing interpolated values are pushed apart
    /// by [`MIN_CM_DIST`] so downstream code can assume a strictly
    /// increasing genetic coordinate.
    pub fn gen_pos(&self, chrom: &str, markers: &Markers) -> Result<Vec<f64>> {
        let mut cm = Vec::with_capacity(markers.len());
        for marker in markers.iter() {
            cm.push(self.cm_pos(chrom, marker.pos)?);
        }
        for j in 1..cm.len() {
            let floor = cm[j - 1] + MIN_CM_DIST;
            if cm[j] < floor {
                cm[j] = floor;
            }
        }
        Ok(cm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::marker::Marker;
    use std::io::Cursor;

    fn test_map() -> PlinkGenMap {
        let text = "\
1 . 0.0 1000
1 . 1.0 2000
1 . 3.0 4000
2 . 0.0 500
2 . 5.0 10500
";
        PlinkGenMap::from_reader(Cursor::new(text), None).unwrap()
    }

    #[test]
    fn test_interpolation_at_and_between_anchors() {
        let map = test_map();
        assert_eq!(map.cm_pos("1", 1000).unwrap(), 0.0);
        assert_eq!(map.cm_pos("1", 2000).unwrap(), 1.0);
        assert!((map.cm_pos("1", 1500).unwrap() - 0.5).abs() < 1e-12);
        assert!((map.cm_pos("1", 3000).unwrap() - 2.0).abs() < 1e-12);
        assert!((map.cm_pos("2", 5500).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_outside_span_is_error() {
        let map = test_map();
        assert!(map.cm_pos("1", 999).is_err());
        assert!(map.cm_pos("1", 4001).is_err());
        assert!(map.cm_pos("3", 1000).is_err());
    }

    #[test]
    fn test_span_and_restrict() {
        let map = test_map();
        assert_eq!(map.span("1"), Some((1000, 4000)));
        assert_eq!(map.span("2"), Some((500, 10500)));

        let text = "1 . 0.0 1000\n2 . 0.0 500\n2 . 5.0 10500\n";
        let map = PlinkGenMap::from_reader(Cursor::new(text), Some("2")).unwrap();
        assert!(!map.has_chrom("1"));
        assert!(map.has_chrom("2"));
    }

    #[test]
    fn test_gen_pos_forces_strict_increase() {
        let map = test_map();
        let markers = Markers::from_vec(vec![
            Marker::new(1500, None, 2),
            Marker::new(1501, None, 2),
            Marker::new(1502, None, 2),
        ]);
        let cm = map.gen_pos("1", &markers).unwrap();
        assert!(cm[1] > cm[0]);
        assert!(cm[2] > cm[1]);
        assert!(cm[1] - cm[0] >= MIN_CM_DIST * 0.999);
    }

    #[test]
    fn test_unsorted_map_is_error() {
        let text = "1 . 0.0 1000\n1 . 1.0 900\n";
        assert!(PlinkGenMap::from_reader(Cursor::new(text), None).is_err());
    }
}

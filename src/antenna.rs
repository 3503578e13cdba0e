//! Antenna coordinate file loading.
//!
//! Format: whitespace-separated `x y z diameter name` per line, `#`
//! comment lines and blank lines ignored. `name` may itself contain
//! spaces, so it is everything remaining on the line after the fourth
//! field.

use std::fs;
use std::path::Path;

use crate::error::IngestError;
use crate::uvw::AntennaCoords;

#[derive(Clone, Debug, PartialEq)]
pub struct Antenna {
    pub coords: AntennaCoords,
    pub diameter: f64,
    pub name: String,
}

pub fn load(path: &Path) -> Result<Vec<Antenna>, IngestError> {
    let text = fs::read_to_string(path).map_err(|e| IngestError::AntennaFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut antennas = Vec::new();
    for (line_no, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let x = fields.next();
        let y = fields.next();
        let z = fields.next();
        let diameter = fields.next();
        let name = fields.collect::<Vec<_>>().join(" ");
        let name = name.as_str();

        let parse = |field: Option<&str>, label: &str| -> Result<f64, IngestError> {
            field
                .ok_or_else(|| IngestError::AntennaFileLine {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                    reason: format!("missing {label} field"),
                })?
                .parse::<f64>()
                .map_err(|_| IngestError::AntennaFileLine {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                    reason: format!("{label} is not a number"),
                })
        };

        antennas.push(Antenna {
            coords: AntennaCoords {
                x: parse(x, "x")?,
                y: parse(y, "y")?,
                z: parse(z, "z")?,
            },
            diameter: parse(diameter, "diameter")?,
            name: name.to_string(),
        });
    }

    Ok(antennas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_coordinates_skipping_comments_and_blanks() {
        let path = tempfile_path("parses-ok");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "# station layout").unwrap();
            writeln!(file).unwrap();
            writeln!(file, "1.0 2.0 3.0 15.0 S0").unwrap();
            writeln!(file, "4.0 5.0 6.0 15.0 S1 extra").unwrap();
        }

        let antennas = load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(antennas.len(), 2);
        assert_eq!(antennas[0].coords, AntennaCoords { x: 1.0, y: 2.0, z: 3.0 });
        assert_eq!(antennas[0].name, "S0");
        assert_eq!(antennas[1].name, "S1 extra");
    }

    #[test]
    fn malformed_row_reports_its_line_number() {
        let path = tempfile_path("malformed-row");
        {
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "1.0 2.0 3.0 15.0 S0").unwrap();
            writeln!(file, "not-a-number 2.0 3.0 15.0 S1").unwrap();
        }

        let err = load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        match err {
            IngestError::AntennaFileLine { line, .. } => assert_eq!(line, 2),
            other => panic!("expected AntennaFileLine, got {other:?}"),
        }
    }

    fn tempfile_path(label: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "spead-vis-ingest-antenna-test-{}-{label}",
            std::process::id()
        ))
    }
}

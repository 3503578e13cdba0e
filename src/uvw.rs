//! Baseline UVW geometry: antenna coordinate differences rotated
//! into the (u, v, w) frame of the current phase centre and hour angle.

/// One antenna's station-frame coordinates, read from the antenna
/// coordinate file (`antenna.rs`).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AntennaCoords {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Baseline ordering: antenna pairs `(i, j)` with `i` from `0..num_stations-1`
/// and `j` from `i..num_stations`, matching the reference's nested loop —
/// this includes the zero-length `i == j` autocorrelation baseline.
fn antenna_differences(antennas: &[AntennaCoords]) -> Vec<AntennaCoords> {
    let num_stations = antennas.len();
    let mut diffs = Vec::new();
    if num_stations == 0 {
        return diffs;
    }
    for i in 0..num_stations - 1 {
        for j in i..num_stations {
            diffs.push(AntennaCoords {
                x: antennas[j].x - antennas[i].x,
                y: antennas[j].y - antennas[i].y,
                z: antennas[j].z - antennas[i].z,
            });
        }
    }
    diffs
}

/// Computes `uu`/`vv`/`ww` for every baseline at the buffer's current
/// `hour_angle = timestamp_count - ra` and phase-centre declination
/// `dec`, in place.
///
/// `uu`, `vv`, `ww` must all have length `num_baselines`; only the first
/// `antenna_differences(antennas).len()` entries (capped at that length)
/// are written, matching the reference which indexes `uu[i]` by the
/// antenna-difference index rather than a separately tracked baseline count.
pub fn calculate_uvw(
    antennas: &[AntennaCoords],
    ra: f64,
    dec: f64,
    timestamp_count: f64,
    uu: &mut [f64],
    vv: &mut [f64],
    ww: &mut [f64],
) {
    let hour_angle = timestamp_count - ra;
    let (ha_sin, ha_cos) = hour_angle.sin_cos();
    let (dec_sin, dec_cos) = dec.sin_cos();

    let diffs = antenna_differences(antennas);
    let n = diffs.len().min(uu.len()).min(vv.len()).min(ww.len());

    for i in 0..n {
        let d = diffs[i];
        uu[i] = ha_sin * d.x + ha_cos * d.y;
        vv[i] = -dec_sin * ha_cos * d.x + dec_sin * ha_sin * d.y + dec_cos * d.z;
        ww[i] = dec_cos * ha_cos * d.x + dec_cos * ha_sin * d.y + dec_sin * d.z;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_baseline_antenna_pair_yields_zero_uvw() {
        let antennas = vec![AntennaCoords { x: 1.0, y: 2.0, z: 3.0 }; 2];
        let mut uu = [0.0; 1];
        let mut vv = [0.0; 1];
        let mut ww = [0.0; 1];
        calculate_uvw(&antennas, 0.1, 0.2, 10.0, &mut uu, &mut vv, &mut ww);
        assert_eq!(uu[0], 0.0);
        assert_eq!(vv[0], 0.0);
        assert_eq!(ww[0], 0.0);
    }

    #[test]
    fn hour_angle_zero_and_dec_zero_projects_onto_xy() {
        let antennas = vec![
            AntennaCoords { x: 0.0, y: 0.0, z: 0.0 },
            AntennaCoords { x: 100.0, y: 0.0, z: 0.0 },
        ];
        let mut uu = [0.0; 1];
        let mut vv = [0.0; 1];
        let mut ww = [0.0; 1];
        // ra == timestamp_count => hour_angle == 0; dec == 0, so the
        // x-baseline projects entirely onto w.
        calculate_uvw(&antennas, 5.0, 0.0, 5.0, &mut uu, &mut vv, &mut ww);
        assert!(uu[0].abs() < 1e-9);
        assert!(vv[0].abs() < 1e-9);
        assert!((ww[0] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn baseline_count_includes_autocorrelations() {
        let antennas = vec![AntennaCoords::default(); 3];
        let diffs = antenna_differences(&antennas);
        // i in 0..=1, j in i..3: (0,0) (0,1) (0,2) (1,1) (1,2) = 5
        assert_eq!(diffs.len(), 5);
    }
}

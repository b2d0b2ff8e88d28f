//! Map export on shutdown.
//!
//! Writes three text files into `<output_root>/<YYYYmmdd_HHMMSS>/`:
//!
//! - `KeyFrameTrajectory.txt`: TUM trajectory, `t tx ty tz qx qy qz qw` (T_wc)
//! - `images.txt`: per keyframe `IMAGE_ID QW QX QY QZ TX TY TZ CAMERA_ID NAME`
//!   with the world-to-camera pose, followed by a line of `X Y POINT3D_ID`
//!   triples (`-1` for unmatched keypoints)
//! - `points3D.txt`: `POINT3D_ID X Y Z R G B ERROR TRACK[]` where the track
//!   lists `IMAGE_ID POINT2D_IDX` pairs
//!
//! Only valid keyframes and landmarks are written. Colors come from the
//! publication color registry; landmarks never published are written black.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{QuoteStyle, WriterBuilder};
use nalgebra::Vector3;
use tracing::info;

use crate::atlas::map::{KeyFrameId, KeyPoint, MapPointId};
use crate::bridge::landmarks::LandmarkDeduplicator;
use crate::error::{BridgeError, Result};
use crate::geometry::SE3;
use crate::system::SharedState;

pub const TRAJECTORY_FILE: &str = "KeyFrameTrajectory.txt";
pub const IMAGES_FILE: &str = "images.txt";
pub const POINTS_FILE: &str = "points3D.txt";

/// Single pinhole camera shared by every image.
const CAMERA_ID: u32 = 1;

#[derive(Debug, Clone)]
struct ExportKeyFrame {
    id: KeyFrameId,
    timestamp_ns: u64,
    pose: SE3,
    features: Vec<(KeyPoint, Option<MapPointId>)>,
}

#[derive(Debug, Clone)]
struct ExportPoint {
    id: MapPointId,
    position: Vector3<f64>,
    track: Vec<(KeyFrameId, usize)>,
}

/// Copy of the valid map, taken under the atlas read lock.
#[derive(Debug, Clone, Default)]
pub struct MapExport {
    keyframes: Vec<ExportKeyFrame>,
    points: Vec<ExportPoint>,
}

impl MapExport {
    pub fn capture(shared: &SharedState) -> Self {
        let (mut keyframes, mut points) = {
            let atlas = shared.atlas.read();
            let map = atlas.active_map();
            let is_valid_point =
                |id: MapPointId| map.get_map_point(id).is_some_and(|mp| !mp.is_bad);

            let keyframes: Vec<ExportKeyFrame> = map
                .keyframes()
                .filter(|kf| !kf.is_bad)
                .map(|kf| ExportKeyFrame {
                    id: kf.id,
                    timestamp_ns: kf.timestamp_ns,
                    pose: kf.pose,
                    features: kf
                        .keypoints
                        .iter()
                        .enumerate()
                        .map(|(idx, kp)| {
                            (*kp, kf.get_map_point(idx).filter(|&id| is_valid_point(id)))
                        })
                        .collect(),
                })
                .collect();

            let points: Vec<ExportPoint> = map
                .map_points()
                .filter(|mp| !mp.is_bad)
                .map(|mp| ExportPoint {
                    id: mp.id,
                    position: mp.position,
                    track: mp
                        .observations
                        .iter()
                        .filter(|(kf_id, _)| {
                            map.get_keyframe(**kf_id).is_some_and(|kf| !kf.is_bad)
                        })
                        .map(|(&kf_id, &idx)| (kf_id, idx))
                        .collect(),
                })
                .collect();

            (keyframes, points)
        };

        keyframes.sort_by_key(|kf| kf.id);
        points.sort_by_key(|p| p.id);
        for p in &mut points {
            p.track.sort();
        }
        Self { keyframes, points }
    }

    pub fn num_keyframes(&self) -> usize {
        self.keyframes.len()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Write all three files into an existing directory.
    pub fn write_to(&self, dir: &Path, colors: &LandmarkDeduplicator) -> Result<()> {
        self.write_trajectory(&dir.join(TRAJECTORY_FILE))?;
        self.write_images(&dir.join(IMAGES_FILE))?;
        self.write_points(&dir.join(POINTS_FILE), colors)?;
        Ok(())
    }

    fn write_trajectory(&self, path: &Path) -> Result<()> {
        let rows = self.keyframes.iter().map(|kf| {
            let t = &kf.pose.translation;
            let q = &kf.pose.rotation;
            vec![
                format!("{:.6}", kf.timestamp_ns as f64 * 1e-9),
                fixed(t.x, 7),
                fixed(t.y, 7),
                fixed(t.z, 7),
                fixed(q.i, 7),
                fixed(q.j, 7),
                fixed(q.k, 7),
                fixed(q.w, 7),
            ]
        });
        write_table(path, &[], rows)
    }

    fn write_images(&self, path: &Path) -> Result<()> {
        let header = [
            "Image list with two lines of data per image:",
            "  IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME",
            "  POINTS2D[] as (X, Y, POINT3D_ID)",
        ];
        let rows = self.keyframes.iter().flat_map(|kf| {
            let t_cw = kf.pose.inverse();
            let q = &t_cw.rotation;
            let t = &t_cw.translation;
            let image = vec![
                kf.id.0.to_string(),
                fixed(q.w, 9),
                fixed(q.i, 9),
                fixed(q.j, 9),
                fixed(q.k, 9),
                fixed(t.x, 9),
                fixed(t.y, 9),
                fixed(t.z, 9),
                CAMERA_ID.to_string(),
                format!("{}.png", kf.timestamp_ns),
            ];

            let mut points = Vec::with_capacity(kf.features.len() * 3);
            for (kp, mp) in &kf.features {
                points.push(format!("{:.2}", kp.x));
                points.push(format!("{:.2}", kp.y));
                points.push(mp.map_or_else(|| "-1".to_string(), |id| id.0.to_string()));
            }
            [image, points]
        });
        write_table(path, &header, rows)
    }

    fn write_points(&self, path: &Path, colors: &LandmarkDeduplicator) -> Result<()> {
        let header = [
            "3D point list with one line of data per point:",
            "  POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)",
        ];
        let rows = self.points.iter().map(|p| {
            let [r, g, b] = colors.published_color(p.id).flatten().unwrap_or_default();
            let mut fields = vec![
                p.id.0.to_string(),
                fixed(p.position.x, 7),
                fixed(p.position.y, 7),
                fixed(p.position.z, 7),
                r.to_string(),
                g.to_string(),
                b.to_string(),
                "0".to_string(),
            ];
            for (kf_id, idx) in &p.track {
                fields.push(kf_id.0.to_string());
                fields.push(idx.to_string());
            }
            fields
        });
        write_table(path, &header, rows)
    }
}

/// Fixed-point text with negative zero printed unsigned.
fn fixed(value: f64, decimals: usize) -> String {
    let text = format!("{:.*}", decimals, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.bytes().all(|b| b == b'0' || b == b'.') => rest.to_string(),
        _ => text,
    }
}

/// `<root>/<YYYYmmdd_HHMMSS>` for the current local time.
pub fn timestamped_dir(root: &Path) -> PathBuf {
    root.join(chrono::Local::now().format("%Y%m%d_%H%M%S").to_string())
}

/// Snapshot the map and write it into a fresh timestamped directory.
///
/// Returns the directory written to.
pub fn export_map(
    shared: &SharedState,
    colors: &LandmarkDeduplicator,
    output_root: &Path,
) -> Result<PathBuf> {
    let dir = timestamped_dir(output_root);
    fs::create_dir_all(&dir).map_err(|source| BridgeError::Export {
        path: dir.clone(),
        source,
    })?;

    let export = MapExport::capture(shared);
    export.write_to(&dir, colors)?;
    info!(
        "Exported {} keyframes and {} landmarks to {}",
        export.num_keyframes(),
        export.num_points(),
        dir.display()
    );
    Ok(dir)
}

/// Write `#`-prefixed header lines, then one space-separated line per row.
///
/// An empty row becomes a blank line. The CSV writer would emit `""` for a
/// record without fields.
fn write_table<I>(path: &Path, header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let export_err = |source: io::Error| BridgeError::Export {
        path: path.to_path_buf(),
        source,
    };

    let mut file = BufWriter::new(File::create(path).map_err(export_err)?);
    for line in header {
        writeln!(file, "# {}", line).map_err(export_err)?;
    }

    let mut builder = WriterBuilder::new();
    builder
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .quote_style(QuoteStyle::Never)
        .buffer_capacity(1024);
    for row in rows {
        if row.is_empty() {
            writeln!(file).map_err(export_err)?;
            continue;
        }
        let mut writer = builder.from_writer(&mut file);
        writer.write_record(&row)?;
        writer.flush().map_err(export_err)?;
    }
    file.flush().map_err(export_err)?;
    Ok(())
}

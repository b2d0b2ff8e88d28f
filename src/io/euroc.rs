//! EuRoC MAV dataset reader (monocular, `cam0` only).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;

use crate::bridge::ingest::IncomingFrame;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    pub timestamp_ns: u64,
    pub filename: String,
}

/// Image list of one camera of a EuRoC sequence.
#[derive(Debug)]
pub struct EurocMonoDataset {
    image_dir: PathBuf,
    pub entries: Vec<ImageEntry>,
}

impl EurocMonoDataset {
    /// Open `<root>/cam0`. `root` is the sequence's `mav0` directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let cam_dir = root.as_ref().join("cam0");
        let entries = load_image_list(&cam_dir.join("data.csv"))?;
        if entries.is_empty() {
            bail!("No images listed in {}", cam_dir.join("data.csv").display());
        }

        Ok(Self {
            image_dir: cam_dir.join("data"),
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn image_path(&self, entry: &ImageEntry) -> PathBuf {
        self.image_dir.join(&entry.filename)
    }

    /// Read the encoded bytes of frame `idx` as an ingestible frame.
    pub fn frame(&self, idx: usize) -> Result<IncomingFrame> {
        let entry = self
            .entries
            .get(idx)
            .with_context(|| format!("Frame index {} out of range ({} frames)", idx, self.len()))?;
        let path = self.image_path(entry);
        let bytes = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(IncomingFrame::encoded(entry.timestamp_ns, bytes))
    }

    /// Iterate over all frames in timestamp order.
    pub fn frames(&self) -> impl Iterator<Item = Result<IncomingFrame>> + '_ {
        (0..self.len()).map(move |idx| self.frame(idx))
    }
}

fn load_image_list(csv_path: &Path) -> Result<Vec<ImageEntry>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut entries = Vec::new();
    for rec in rdr.records() {
        let rec = rec?;
        if rec.len() < 2 {
            continue;
        }
        let ts: u64 = rec[0]
            .trim()
            .parse()
            .with_context(|| format!("Bad timestamp '{}' in {}", &rec[0], csv_path.display()))?;
        let filename = rec[1].trim().to_string();
        entries.push(ImageEntry {
            timestamp_ns: ts,
            filename,
        });
    }
    entries.sort_by_key(|e| e.timestamp_ns);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ingest::FramePayload;

    fn write_sequence(root: &Path) {
        let cam = root.join("cam0");
        fs::create_dir_all(cam.join("data")).unwrap();
        fs::write(
            cam.join("data.csv"),
            "#timestamp [ns],filename\n\
             1403636579863555584,1403636579863555584.png\n\
             1403636579813555456,1403636579813555456.png\n",
        )
        .unwrap();
        fs::write(cam.join("data/1403636579813555456.png"), b"first").unwrap();
        fs::write(cam.join("data/1403636579863555584.png"), b"second").unwrap();
    }

    #[test]
    fn test_reads_sorted_image_list_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path());

        let dataset = EurocMonoDataset::new(dir.path()).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.entries[0].timestamp_ns, 1403636579813555456);

        let frame = dataset.frame(0).unwrap();
        assert_eq!(frame.timestamp_ns, 1403636579813555456);
        match frame.payload {
            FramePayload::Encoded(bytes) => assert_eq!(bytes, b"first"),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(dataset.frames().count(), 2);
    }

    #[test]
    fn test_missing_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EurocMonoDataset::new(dir.path()).is_err());
    }

    #[test]
    fn test_missing_image_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write_sequence(dir.path());
        fs::remove_file(dir.path().join("cam0/data/1403636579863555584.png")).unwrap();

        let dataset = EurocMonoDataset::new(dir.path()).unwrap();
        assert!(dataset.frame(0).is_ok());
        assert!(dataset.frame(1).is_err());
        assert!(dataset.frame(2).is_err());
    }
}

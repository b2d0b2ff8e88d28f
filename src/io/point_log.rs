//! Point log sink: records every published landmark as `id,x,y,z,r,g,b`.
//!
//! Points are numbered in arrival order. The file is truncated when the sink
//! is created and flushed after every cloud.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::{Writer, WriterBuilder};
use tracing::warn;

use crate::bridge::sink::PublishSink;
use crate::system::messages::{Channel, OutboundRecord, PointCloudRecord};

pub struct PointLogSink {
    path: PathBuf,
    writer: Writer<BufWriter<File>>,
    next_id: u64,
}

impl PointLogSink {
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create point log {}", path.display()))?;
        let writer = WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            next_id: 0,
        })
    }

    /// Points written so far.
    pub fn num_points(&self) -> u64 {
        self.next_id
    }

    fn append(&mut self, cloud: &PointCloudRecord) -> Result<()> {
        for point in &cloud.points {
            let [r, g, b] = point.rgb();
            self.writer
                .serialize((self.next_id, point.x, point.y, point.z, r, g, b))?;
            self.next_id += 1;
        }
        self.writer.flush()?;
        Ok(())
    }
}

impl PublishSink for PointLogSink {
    fn publish(&mut self, _channel: Channel, record: OutboundRecord) {
        let OutboundRecord::PointCloud(cloud) = record else {
            return;
        };
        if let Err(e) = self.append(&cloud) {
            warn!("Point log {} write failed: {:#}", self.path.display(), e);
        }
    }
}

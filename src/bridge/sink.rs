//! Publish sinks: where outbound records go.
//!
//! `publish` is fire-and-forget. A sink absorbs its own delivery failures;
//! nothing is reported back to the scheduler.

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info};

use crate::config::TopicConfig;
use crate::system::messages::{Channel, OutboundRecord};

/// Destination for outbound records.
pub trait PublishSink: Send {
    fn publish(&mut self, channel: Channel, record: OutboundRecord);
}

impl<S: PublishSink + ?Sized> PublishSink for Box<S> {
    fn publish(&mut self, channel: Channel, record: OutboundRecord) {
        (**self).publish(channel, record);
    }
}

/// One record as delivered to a [`ChannelSink`].
#[derive(Debug, Clone)]
pub struct Publication {
    pub channel: Channel,
    pub record: OutboundRecord,
}

/// Forwards every publication into an in-process channel, preserving order.
pub struct ChannelSink {
    tx: Sender<Publication>,
}

impl ChannelSink {
    /// Create the sink and the receiving end of its channel.
    pub fn new() -> (Self, Receiver<Publication>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl PublishSink for ChannelSink {
    fn publish(&mut self, channel: Channel, record: OutboundRecord) {
        if self.tx.send(Publication { channel, record }).is_err() {
            debug!("Publication on {} dropped: receiver gone", channel);
        }
    }
}

/// Logs a one-line summary of every publication under its topic name.
pub struct LogSink {
    topics: TopicConfig,
}

impl LogSink {
    pub fn new(topics: TopicConfig) -> Self {
        Self { topics }
    }
}

impl PublishSink for LogSink {
    fn publish(&mut self, channel: Channel, record: OutboundRecord) {
        let topic = self.topics.topic(channel);
        match &record {
            OutboundRecord::Pose(pose) => debug!(
                "{} frame={} t={:.6} p=[{:.3}, {:.3}, {:.3}]",
                topic,
                pose.frame_id,
                pose.stamp_ns as f64 / 1e9,
                pose.position[0],
                pose.position[1],
                pose.position[2]
            ),
            OutboundRecord::Image(img) => debug!(
                "{} frame={} {}x{} t={:.6}",
                topic,
                img.keyframe_id,
                img.image.width,
                img.image.height,
                img.image.timestamp_ns as f64 / 1e9
            ),
            OutboundRecord::PointCloud(cloud) => info!(
                "{} frame={} points={}",
                topic, cloud.frame_id, cloud.width
            ),
        }
    }
}

/// Delivers every publication to each inner sink in turn.
pub struct FanoutSink {
    sinks: Vec<Box<dyn PublishSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Box<dyn PublishSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl PublishSink for FanoutSink {
    fn publish(&mut self, channel: Channel, record: OutboundRecord) {
        let Some((last, rest)) = self.sinks.split_last_mut() else {
            return;
        };
        for sink in rest {
            sink.publish(channel, record.clone());
        }
        last.publish(channel, record);
    }
}

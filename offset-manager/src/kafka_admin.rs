//! A concrete `SystemAdmin` backed by `rdkafka`, built the way the reference
//! runtime's Kafka client wrappers build theirs: one `ClientConfig` assembled
//! from the shared `KafkaConfig`, with broker calls kept to the minimum this
//! core actually needs. This is one legal `SystemAdmin`, not the only one —
//! the trait in `crate::traits` remains the extension point.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common_kafka::config::KafkaConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::{ClientConfig, Offset as RdOffset, TopicPartitionList};
use tracing::{debug, warn};

use crate::model::{Offset, PartitionMetadata, Ssp, Startpoint, SystemStreamMetadata};
use crate::traits::SystemAdmin;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin wrapper around a `BaseConsumer` used purely for broker metadata and
/// offset arithmetic; it never subscribes or consumes a stream of records.
pub struct KafkaSystemAdmin {
    consumer: BaseConsumer,
    timeout: Duration,
}

impl KafkaSystemAdmin {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(config: &KafkaConfig, timeout: Duration) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("group.id", "offset-manager-admin")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false");

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }

        debug!("rdkafka admin configuration: {:?}", client_config);
        let consumer: BaseConsumer = client_config.create()?;
        Ok(Self { consumer, timeout })
    }

    /// Fetches broker-reported bounds for every partition of `topic`, for use
    /// building the `SystemStreamMetadata` that `SettingsBuilder` and Stage C
    /// of the resolver consult. Not part of the `SystemAdmin` trait itself:
    /// the container-bootstrap glue calls this once per input stream before
    /// constructing the offset manager.
    pub fn fetch_stream_metadata(&self, topic: &str) -> anyhow::Result<SystemStreamMetadata> {
        let metadata = self
            .consumer
            .fetch_metadata(Some(topic), self.timeout)?;
        let Some(topic_metadata) = metadata.topics().iter().find(|t| t.name() == topic) else {
            return Ok(SystemStreamMetadata::default());
        };

        let mut per_partition = HashMap::new();
        for partition in topic_metadata.partitions() {
            let partition_id = partition.id() as u32;
            match self
                .consumer
                .fetch_watermarks(topic, partition.id(), self.timeout)
            {
                Ok((low, high)) => {
                    per_partition.insert(
                        partition_id,
                        PartitionMetadata {
                            oldest: Some(Offset::new(low.to_string())),
                            newest: if high > low {
                                Some(Offset::new((high - 1).to_string()))
                            } else {
                                None
                            },
                            upcoming: Some(Offset::new(high.to_string())),
                        },
                    );
                }
                Err(error) => {
                    warn!(topic, partition = partition.id(), error = %error, "failed to fetch watermarks");
                }
            }
        }

        Ok(SystemStreamMetadata { per_partition })
    }

    fn topic_partition_list(ssp: &Ssp, offset: RdOffset) -> TopicPartitionList {
        let mut list = TopicPartitionList::new();
        list.add_partition_offset(ssp.stream(), ssp.partition as i32, offset)
            .expect("valid offset");
        list
    }
}

#[async_trait]
impl SystemAdmin for KafkaSystemAdmin {
    async fn get_offsets_after(
        &self,
        offsets: &HashMap<Ssp, Offset>,
    ) -> anyhow::Result<HashMap<Ssp, Offset>> {
        // Kafka offsets are monotonically increasing i64s, so "the offset
        // after" is purely numeric; no broker round-trip is needed.
        let mut result = HashMap::new();
        for (ssp, offset) in offsets {
            match offset.as_str().parse::<i64>() {
                Ok(value) => {
                    result.insert(ssp.clone(), Offset::new((value + 1).to_string()));
                }
                Err(_) => {
                    warn!(ssp = %ssp, offset = %offset, "checkpointed offset is not a valid Kafka offset, skipping");
                }
            }
        }
        Ok(result)
    }

    async fn resolve_startpoint_to_offset(
        &self,
        ssp: &Ssp,
        startpoint: &Startpoint,
    ) -> anyhow::Result<Option<Offset>> {
        match startpoint {
            Startpoint::Specific(offset) => Ok(Some(offset.clone())),
            Startpoint::Oldest => {
                let (low, _high) = self
                    .consumer
                    .fetch_watermarks(ssp.stream(), ssp.partition as i32, self.timeout)?;
                Ok(Some(Offset::new(low.to_string())))
            }
            Startpoint::Upcoming => {
                let (_low, high) = self
                    .consumer
                    .fetch_watermarks(ssp.stream(), ssp.partition as i32, self.timeout)?;
                Ok(Some(Offset::new(high.to_string())))
            }
            Startpoint::Timestamp(millis) => {
                let request = Self::topic_partition_list(ssp, RdOffset::Offset(*millis));
                let resolved = self.consumer.offsets_for_times(request, self.timeout)?;
                let offset = resolved
                    .elements()
                    .iter()
                    .find(|elem| elem.partition() == ssp.partition as i32)
                    .and_then(|elem| match elem.offset() {
                        RdOffset::Offset(value) => Some(Offset::new(value.to_string())),
                        _ => None,
                    });
                Ok(offset)
            }
            // No broker-side resolution defined for opaque custom
            // startpoints; the resolver falls through to Stage C.
            Startpoint::Custom(_) => Ok(None),
        }
    }

    fn offset_comparator(&self, a: &Offset, b: &Offset) -> Option<Ordering> {
        match (a.as_str().parse::<i64>(), b.as_str().parse::<i64>()) {
            (Ok(a), Ok(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}

//! Protobuf decoder for GTFS Realtime vehicle position feeds.

use bytes::Buf;
use chrono::{DateTime, Utc};
use prost::Message;
use prost::encoding::{WireType, decode_key, decode_varint};
use tracing::{debug, warn};

use crate::error::DecodeError;
use crate::gtfs_rt::{FeedEntity, FeedHeader, FeedMessage};

const FEED_HEADER_TAG: u32 = 1;
const FEED_ENTITY_TAG: u32 = 2;

/// One decoded scalar, before the sanitizer resolves it.
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Present(T),
    Absent,
    /// Carried by the feed but unusable. Only coordinates produce this (a
    /// non-finite float). Text fields arrive as UTF-8 checked by prost, so
    /// they are either `Present` or, when blank, `Absent`.
    Malformed,
}

impl<T> Field<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Absent | Field::Malformed => None,
        }
    }

    /// Returns `other` when this field is absent. A malformed value is kept,
    /// so a fallback never masks corruption in the primary source.
    pub fn or(self, other: Field<T>) -> Field<T> {
        match self {
            Field::Absent => other,
            field => field,
        }
    }
}

impl Field<String> {
    fn from_text(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(s) if !s.is_empty() => Field::Present(s.to_string()),
            _ => Field::Absent,
        }
    }
}

impl Field<f64> {
    fn from_coordinate(value: f32) -> Self {
        if value.is_finite() {
            Field::Present(f64::from(value))
        } else {
            Field::Malformed
        }
    }
}

/// A vehicle entity as carried by the feed. Any field may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntity {
    pub vehicle_id: Field<String>,
    pub lat: Field<f64>,
    pub lon: Field<f64>,
    pub route_id: Field<String>,
}

impl RawEntity {
    fn from_feed_entity(entity: &FeedEntity) -> Option<Self> {
        if entity.is_deleted == Some(true) {
            return None;
        }
        let vp = entity.vehicle.as_ref()?;

        let vehicle_id = match &vp.vehicle {
            Some(desc) => Field::from_text(desc.id.as_deref())
                .or(Field::from_text(desc.label.as_deref())),
            None => Field::Absent,
        };
        let route_id = Field::from_text(vp.trip.as_ref().and_then(|t| t.route_id.as_deref()));
        let (lat, lon) = match &vp.position {
            Some(pos) => (
                Field::from_coordinate(pos.latitude),
                Field::from_coordinate(pos.longitude),
            ),
            None => (Field::Absent, Field::Absent),
        };

        Some(Self {
            vehicle_id,
            lat,
            lon,
            route_id,
        })
    }
}

/// Result of decoding one feed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFeed {
    pub version: String,
    pub feed_timestamp: Option<DateTime<Utc>>,
    pub entities: Vec<RawEntity>,
    /// Entities in the payload, vehicle or not.
    pub total_entities: usize,
    /// Entity frames that could not be decoded and were dropped.
    pub malformed_entities: usize,
    /// Whether the payload only decoded frame by frame.
    pub salvaged: bool,
}

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, DecodeError> {
    FeedMessage::decode(bytes).map_err(|e| DecodeError::MalformedPayload(e.to_string()))
}

/// Decoder bound to the feed schema versions compiled into this crate.
#[derive(Debug, Clone)]
pub struct FeedDecoder {
    supported_versions: Vec<String>,
}

impl Default for FeedDecoder {
    fn default() -> Self {
        Self::new(vec!["1.0".to_string(), "2.0".to_string()])
    }
}

impl FeedDecoder {
    pub fn new(supported_versions: Vec<String>) -> Self {
        Self { supported_versions }
    }

    /// Decodes `bytes` into vehicle entities, skipping non-vehicle entities.
    ///
    /// A payload that fails to decode as a whole is retried entity by entity;
    /// it is only rejected when no entity can be recovered.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedFeed, DecodeError> {
        let (header, entities, malformed, salvaged) = match parse_feed(bytes) {
            Ok(feed) => (Some(feed.header), feed.entity, 0, false),
            Err(e) => {
                let salvage = salvage_entities(bytes);
                if salvage.entities.is_empty() {
                    return Err(e);
                }
                warn!(
                    error = %e,
                    recovered = salvage.entities.len(),
                    malformed = salvage.malformed,
                    "Feed payload partially malformed, recovered entities individually"
                );
                (salvage.header, salvage.entities, salvage.malformed, true)
            }
        };

        let version = header
            .as_ref()
            .map(|h| h.gtfs_realtime_version.trim().to_string())
            .unwrap_or_default();
        self.check_version(&version)?;

        let feed_timestamp = header
            .as_ref()
            .and_then(|h| h.timestamp)
            .and_then(|ts| i64::try_from(ts).ok())
            .and_then(|ts| DateTime::from_timestamp(ts, 0));

        let mut out = Vec::with_capacity(entities.len());
        out.extend(entities.iter().filter_map(RawEntity::from_feed_entity));

        debug!(
            version = %version,
            total = entities.len(),
            vehicles = out.len(),
            "Feed decoded"
        );

        Ok(DecodedFeed {
            version,
            feed_timestamp,
            total_entities: entities.len() + malformed,
            entities: out,
            malformed_entities: malformed,
            salvaged,
        })
    }

    /// Versions are compared by major number; a feed that omits the version
    /// is decoded with the compiled schema.
    fn check_version(&self, version: &str) -> Result<(), DecodeError> {
        if version.is_empty() {
            return Ok(());
        }
        let major = |v: &str| v.trim().split('.').next().unwrap_or_default().to_string();
        let wanted = major(version);
        if self.supported_versions.iter().any(|v| major(v) == wanted) {
            Ok(())
        } else {
            Err(DecodeError::SchemaUnavailable {
                version: version.to_string(),
            })
        }
    }
}

struct Salvage {
    header: Option<FeedHeader>,
    entities: Vec<FeedEntity>,
    malformed: usize,
}

/// Walks the top-level fields of a `FeedMessage` and decodes each entity
/// frame on its own. Stops at the first frame whose framing is broken.
fn salvage_entities(bytes: &[u8]) -> Salvage {
    let mut buf = bytes;
    let mut salvage = Salvage {
        header: None,
        entities: Vec::new(),
        malformed: 0,
    };

    while buf.has_remaining() {
        let Ok((tag, wire_type)) = decode_key(&mut buf) else {
            salvage.malformed += 1;
            break;
        };
        let skip = match wire_type {
            WireType::LengthDelimited => {
                let Some(len) = decode_varint(&mut buf)
                    .ok()
                    .and_then(|len| usize::try_from(len).ok())
                    .filter(|len| *len <= buf.remaining())
                else {
                    salvage.malformed += 1;
                    break;
                };
                let (frame, rest) = buf.split_at(len);
                buf = rest;
                match tag {
                    FEED_HEADER_TAG => salvage.header = FeedHeader::decode(frame).ok(),
                    FEED_ENTITY_TAG => match FeedEntity::decode(frame) {
                        Ok(entity) => salvage.entities.push(entity),
                        Err(_) => salvage.malformed += 1,
                    },
                    _ => {}
                }
                0
            }
            WireType::Varint => match decode_varint(&mut buf) {
                Ok(_) => 0,
                Err(_) => break,
            },
            WireType::SixtyFourBit => 8,
            WireType::ThirtyTwoBit => 4,
            WireType::StartGroup | WireType::EndGroup => break,
        };
        if skip > buf.remaining() {
            break;
        }
        buf.advance(skip);
    }

    salvage
}

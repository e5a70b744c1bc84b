//! Decoder registry
//!
//! Maps `(type tag, object version)` to a decode function. The registry is
//! populated explicitly at startup; there is no discovery at decode time.
//!
//! Dispatch failures are distinct:
//! - tag never registered: `Error::UnknownTypeForDecode`
//! - tag known, version not registered: `Error::UnsupportedEncodingVersion`

use crate::{Decodable, DecoderInput};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fmt;
use termstore_core::{Error, Result};

/// Decode function for one `(tag, version)` pair
///
/// Receives the input positioned at the payload and the object version read
/// from the frame.
pub type DecodeFn<T> = Box<dyn Fn(&mut DecoderInput<'_>, i32) -> Result<T> + Send + Sync>;

/// Registry of decoders producing values of type `T`
pub struct DecoderRegistry<T> {
    decoders: FxHashMap<&'static str, BTreeMap<i32, DecodeFn<T>>>,
}

impl<T> DecoderRegistry<T> {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            decoders: FxHashMap::default(),
        }
    }

    /// Register a decode function for one tag and version
    ///
    /// A later registration for the same pair replaces the earlier one.
    pub fn register(
        &mut self,
        type_tag: &'static str,
        version: i32,
        decode: impl Fn(&mut DecoderInput<'_>, i32) -> Result<T> + Send + Sync + 'static,
    ) -> &mut Self {
        self.decoders
            .entry(type_tag)
            .or_default()
            .insert(version, Box::new(decode));
        self
    }

    /// Register every readable version of a [`Decodable`] type
    pub fn register_decodable<D>(&mut self) -> &mut Self
    where
        D: Decodable + 'static,
        T: From<D> + 'static,
    {
        for version in D::MIN_ENCODING_VERSION..=D::ENCODING_VERSION {
            self.register(D::TYPE_TAG, version, |input, version| {
                D::decode_fields(input, version).map(T::from)
            });
        }
        self
    }

    /// True if any version of `type_tag` is registered
    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.decoders.contains_key(type_tag)
    }

    /// Registered versions of `type_tag`, ascending
    pub fn versions(&self, type_tag: &str) -> Vec<i32> {
        self.decoders
            .get(type_tag)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Registered tags, sorted
    pub fn type_tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<&'static str> = self.decoders.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    /// Decode a complete frame
    pub fn decode(&self, bytes: &[u8]) -> Result<T> {
        let mut input = DecoderInput::new(bytes)?;
        let value = self.decode_framed(&mut input)?;
        input.expect_end()?;
        Ok(value)
    }

    /// Decode the tag, version and payload that follow the container version
    ///
    /// Leaves the input positioned after the payload, so frames can be read
    /// back to back from one stream.
    pub fn decode_framed(&self, input: &mut DecoderInput<'_>) -> Result<T> {
        let tag = input.read_string()?;
        let versions = self
            .decoders
            .get(tag.as_str())
            .ok_or_else(|| Error::UnknownTypeForDecode(tag.clone()))?;

        let version = input.read_i32()?;
        let decode = versions.get(&version).ok_or_else(|| {
            let min = versions.keys().next().copied().unwrap_or(version);
            let max = versions.keys().next_back().copied().unwrap_or(version);
            Error::UnsupportedEncodingVersion {
                what: tag.clone(),
                found: version,
                min,
                max,
            }
        })?;

        decode(input, version)
    }
}

impl<T> Default for DecoderRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for DecoderRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for tag in self.type_tags() {
            map.entry(&tag, &self.versions(tag));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Encodable, EncoderOutput};

    #[derive(Debug, PartialEq)]
    enum Shape {
        Circle(i32),
        Label(String),
    }

    struct Circle(i32);

    impl Encodable for Circle {
        const TYPE_TAG: &'static str = "test.Circle";
        const ENCODING_VERSION: i32 = 1;

        fn encode_fields(&self, out: &mut EncoderOutput) {
            out.write_i32(self.0);
        }
    }

    impl Decodable for Circle {
        fn decode_fields(input: &mut DecoderInput<'_>, _version: i32) -> Result<Self> {
            Ok(Circle(input.read_i32()?))
        }
    }

    impl From<Circle> for Shape {
        fn from(circle: Circle) -> Self {
            Shape::Circle(circle.0)
        }
    }

    fn registry() -> DecoderRegistry<Shape> {
        let mut registry = DecoderRegistry::new();
        registry
            .register_decodable::<Circle>()
            .register("test.Label", 3, |input, _| {
                Ok(Shape::Label(input.read_string()?))
            })
            .register("test.Label", 5, |input, _| {
                Ok(Shape::Label(input.read_string()?.to_uppercase()))
            });
        registry
    }

    fn label_frame(version: i32, text: &str) -> Vec<u8> {
        let mut out = EncoderOutput::new();
        out.write_frame_header("test.Label", version);
        out.write_string(text);
        out.into_bytes().unwrap()
    }

    #[test]
    fn test_dispatch_by_tag() {
        let registry = registry();
        assert_eq!(registry.decode(&Circle(7).to_bytes().unwrap()).unwrap(), Shape::Circle(7));
        assert_eq!(
            registry.decode(&label_frame(3, "ab")).unwrap(),
            Shape::Label("ab".to_string())
        );
    }

    #[test]
    fn test_dispatch_by_version() {
        let registry = registry();
        assert_eq!(
            registry.decode(&label_frame(5, "ab")).unwrap(),
            Shape::Label("AB".to_string())
        );
    }

    #[test]
    fn test_unknown_tag() {
        let mut out = EncoderOutput::new();
        out.write_frame_header("test.Square", 1);
        let err = registry().decode(&out.into_bytes().unwrap()).unwrap_err();
        assert!(matches!(err, Error::UnknownTypeForDecode(tag) if tag == "test.Square"));
    }

    #[test]
    fn test_unregistered_version_reports_known_range() {
        let err = registry().decode(&label_frame(4, "x")).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedEncodingVersion { found: 4, min: 3, max: 5, .. }
        ));
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut stream = Circle(1).to_bytes().unwrap();
        // second frame shares the stream's container version
        let second = Circle(2).to_bytes().unwrap();
        stream.extend_from_slice(&second[4..]);

        let registry = registry();
        let mut input = DecoderInput::new(&stream).unwrap();
        assert_eq!(registry.decode_framed(&mut input).unwrap(), Shape::Circle(1));
        assert_eq!(registry.decode_framed(&mut input).unwrap(), Shape::Circle(2));
        input.expect_end().unwrap();
    }

    #[test]
    fn test_introspection() {
        let registry = registry();
        assert!(registry.is_registered("test.Circle"));
        assert!(!registry.is_registered("test.Square"));
        assert_eq!(registry.versions("test.Label"), vec![3, 5]);
        assert_eq!(registry.type_tags(), vec!["test.Circle", "test.Label"]);
    }
}

//! Binary codec for whiteboard operation records.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬──────────┬──────────┬───────────┬──────────┐
//! │ kind     │ scene    │ page     │ timestamp │ payload  │
//! │ 1 byte   │ u32      │ u32      │ i64       │ variable │
//! └──────────┴──────────┴──────────┴───────────┴──────────┘
//! ```
//!
//! The payload is itself an encoded value, decoded on demand through typed
//! accessors. Old readers carry unknown payloads through untouched, so new
//! payload fields never break them — the store treats drawn content as
//! opaque bytes end to end.

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Package kinds with pinned wire codes.
///
/// Codes 7–10 decode fine but the store rejects them as unsupported
/// administrative operations. Unknown codes are a decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum PackageType {
    /// Batch of opaque drawing primitives
    DrawCommand = 0,
    /// Move the session to another (scene, page)
    SwitchScenePage = 1,
    /// Wipe the current page
    CleanDraw = 2,
    /// Query: serialize a page's reconstructed state
    ScenePageData = 3,
    /// Full-state snapshot marker (payload supplied by the client)
    KeyFrame = 4,
    /// Register a scene and its fixed page count
    AddScene = 5,
    /// Query: report the current (scene, page) pointer
    SceneData = 6,
    /// Rejected: per-user draw permission toggles
    EnableUserDraw = 7,
    /// Rejected: scene removal
    DeleteScene = 8,
    /// Rejected: scene metadata edits
    ModifyScene = 9,
    /// Rejected: scene reordering
    SceneOrderChange = 10,
    /// View transform change for one page
    PageChange = 11,
    /// Opaque text record for forward-compatible extensions
    Extension = 12,
}

impl From<PackageType> for u8 {
    fn from(kind: PackageType) -> u8 {
        kind as u8
    }
}

impl TryFrom<u8> for PackageType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(PackageType::DrawCommand),
            1 => Ok(PackageType::SwitchScenePage),
            2 => Ok(PackageType::CleanDraw),
            3 => Ok(PackageType::ScenePageData),
            4 => Ok(PackageType::KeyFrame),
            5 => Ok(PackageType::AddScene),
            6 => Ok(PackageType::SceneData),
            7 => Ok(PackageType::EnableUserDraw),
            8 => Ok(PackageType::DeleteScene),
            9 => Ok(PackageType::ModifyScene),
            10 => Ok(PackageType::SceneOrderChange),
            11 => Ok(PackageType::PageChange),
            12 => Ok(PackageType::Extension),
            other => Err(format!("unknown package type code {other}")),
        }
    }
}

/// List of opaque drawing primitives carried by a `DrawCommand`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DrawOps {
    pub ops: Vec<Vec<u8>>,
}

/// Scene descriptor carried by an `AddScene` package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScene {
    pub resource_id: String,
    pub resource_url: String,
    pub page_count: u32,
    pub scene_type: u32,
    /// Requested scene index; immutable once assigned
    pub index: u32,
}

/// View transform for one page (rotation, zoom, pan).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageTransform {
    pub angle: f32,
    pub scale: f32,
    pub move_x: f32,
    pub move_y: f32,
}

impl Default for PageTransform {
    fn default() -> Self {
        Self {
            angle: 0.0,
            scale: 1.0,
            move_x: 0.0,
            move_y: 0.0,
        }
    }
}

/// One operation/control record in the log.
///
/// Re-encoding a decoded package reproduces its bytes exactly (the payload
/// is carried opaque), which is what lets a recovered keyframe blob equal
/// the original record byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub kind: PackageType,
    pub scene: u32,
    pub page: u32,
    pub timestamp: i64,
    /// Kind-specific payload; empty for pure control kinds
    pub payload: Vec<u8>,
}

impl Package {
    /// Create a draw command from a list of opaque primitives.
    pub fn draw(scene: u32, page: u32, timestamp: i64, ops: Vec<Vec<u8>>) -> Self {
        let payload = encode_payload(&DrawOps { ops });
        Self {
            kind: PackageType::DrawCommand,
            scene,
            page,
            timestamp,
            payload,
        }
    }

    /// Create a page wipe marker.
    pub fn clean(scene: u32, page: u32, timestamp: i64) -> Self {
        Self::control(PackageType::CleanDraw, scene, page, timestamp)
    }

    /// Create a keyframe marker. The client may attach a full-state payload;
    /// the store carries it through opaque.
    pub fn keyframe(scene: u32, page: u32, timestamp: i64) -> Self {
        Self::control(PackageType::KeyFrame, scene, page, timestamp)
    }

    /// Create a page switch record.
    pub fn switch_page(scene: u32, page: u32, timestamp: i64) -> Self {
        Self::control(PackageType::SwitchScenePage, scene, page, timestamp)
    }

    /// Create a scene registration record.
    pub fn add_scene(timestamp: i64, info: &NewScene) -> Self {
        Self {
            kind: PackageType::AddScene,
            scene: info.index,
            page: 0,
            timestamp,
            payload: encode_payload(info),
        }
    }

    /// Create a view transform change for a page.
    pub fn page_change(scene: u32, page: u32, timestamp: i64, transform: PageTransform) -> Self {
        Self {
            kind: PackageType::PageChange,
            scene,
            page,
            timestamp,
            payload: encode_payload(&transform),
        }
    }

    /// Create an extension record with an opaque text payload.
    pub fn extension(scene: u32, page: u32, timestamp: i64, text: &str) -> Self {
        Self {
            kind: PackageType::Extension,
            scene,
            page,
            timestamp,
            payload: encode_payload(&text.to_string()),
        }
    }

    /// Create a current-pointer query.
    pub fn scene_data(timestamp: i64) -> Self {
        Self::control(PackageType::SceneData, 0, 0, timestamp)
    }

    /// Create a page serialization query.
    pub fn scene_page_data(scene: u32, page: u32, timestamp: i64) -> Self {
        Self::control(PackageType::ScenePageData, scene, page, timestamp)
    }

    fn control(kind: PackageType, scene: u32, page: u32, timestamp: i64) -> Self {
        Self {
            kind,
            scene,
            page,
            timestamp,
            payload: Vec::new(),
        }
    }

    /// Serialize to the binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| StoreError::Decode(format!("encode package: {e}")))
    }

    /// Deserialize from the binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let (package, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Decode(format!("decode package: {e}")))?;
        Ok(package)
    }

    /// Parse the drawing primitive list of a `DrawCommand`.
    pub fn draw_ops(&self) -> Result<DrawOps, StoreError> {
        if self.kind != PackageType::DrawCommand {
            return Err(StoreError::Decode(format!(
                "expected DrawCommand payload, found {:?}",
                self.kind
            )));
        }
        decode_payload(&self.payload)
    }

    /// Parse the scene descriptor of an `AddScene`.
    pub fn new_scene(&self) -> Result<NewScene, StoreError> {
        if self.kind != PackageType::AddScene {
            return Err(StoreError::Decode(format!(
                "expected AddScene payload, found {:?}",
                self.kind
            )));
        }
        decode_payload(&self.payload)
    }

    /// Parse the view transform of a `PageChange`.
    pub fn page_transform(&self) -> Result<PageTransform, StoreError> {
        if self.kind != PackageType::PageChange {
            return Err(StoreError::Decode(format!(
                "expected PageChange payload, found {:?}",
                self.kind
            )));
        }
        decode_payload(&self.payload)
    }

    /// Parse the opaque text of an `Extension`.
    pub fn extension_text(&self) -> Result<String, StoreError> {
        if self.kind != PackageType::Extension {
            return Err(StoreError::Decode(format!(
                "expected Extension payload, found {:?}",
                self.kind
            )));
        }
        decode_payload(&self.payload)
    }
}

fn encode_payload<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).unwrap_or_default()
}

fn decode_payload<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| StoreError::Decode(format!("decode payload: {e}")))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_roundtrip() {
        let pkg = Package::draw(1, 2, 1000, vec![b"line".to_vec(), b"arc".to_vec()]);
        let encoded = pkg.encode().unwrap();
        let decoded = Package::decode(&encoded).unwrap();

        assert_eq!(decoded.kind, PackageType::DrawCommand);
        assert_eq!(decoded.scene, 1);
        assert_eq!(decoded.page, 2);
        assert_eq!(decoded.timestamp, 1000);
        assert_eq!(decoded.draw_ops().unwrap().ops, vec![b"line".to_vec(), b"arc".to_vec()]);
    }

    #[test]
    fn test_add_scene_roundtrip() {
        let info = NewScene {
            resource_id: "r1".into(),
            resource_url: "doc1".into(),
            page_count: 3,
            scene_type: 0,
            index: 0,
        };
        let pkg = Package::add_scene(5, &info);
        let decoded = Package::decode(&pkg.encode().unwrap()).unwrap();

        assert_eq!(decoded.kind, PackageType::AddScene);
        assert_eq!(decoded.new_scene().unwrap(), info);
    }

    #[test]
    fn test_page_change_roundtrip() {
        let transform = PageTransform {
            angle: 90.0,
            scale: 1.5,
            move_x: 10.0,
            move_y: -20.0,
        };
        let pkg = Package::page_change(0, 1, 7, transform);
        let decoded = Package::decode(&pkg.encode().unwrap()).unwrap();
        assert_eq!(decoded.page_transform().unwrap(), transform);
    }

    #[test]
    fn test_control_kinds_carry_no_payload() {
        for pkg in [
            Package::clean(0, 0, 1),
            Package::keyframe(0, 0, 2),
            Package::switch_page(1, 1, 3),
            Package::scene_data(4),
            Package::scene_page_data(0, 0, 5),
        ] {
            assert!(pkg.payload.is_empty(), "{:?} carries a payload", pkg.kind);
            let decoded = Package::decode(&pkg.encode().unwrap()).unwrap();
            assert_eq!(decoded, pkg);
        }
    }

    #[test]
    fn test_reencode_is_identity() {
        let pkg = Package::draw(3, 1, 99, vec![vec![1, 2, 3]]);
        let first = pkg.encode().unwrap();
        let second = Package::decode(&first).unwrap().encode().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_opaque_payload_survives_roundtrip() {
        // A keyframe with a client-attached payload the store does not parse.
        let mut pkg = Package::keyframe(0, 0, 1);
        pkg.payload = vec![0xDE, 0xAD, 0xBE, 0xEF];
        let decoded = Package::decode(&pkg.encode().unwrap()).unwrap();
        assert_eq!(decoded.payload, pkg.payload);
    }

    #[test]
    fn test_wrong_kind_accessor_rejected() {
        let pkg = Package::clean(0, 0, 1);
        assert!(pkg.draw_ops().is_err());
        assert!(pkg.new_scene().is_err());
        assert!(pkg.page_transform().is_err());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(Package::decode(&[0xFF, 0xFE, 0xFD]).is_err());
        assert!(Package::decode(&[]).is_err());
    }

    #[test]
    fn test_type_codes_pinned() {
        assert_eq!(u8::from(PackageType::DrawCommand), 0);
        assert_eq!(u8::from(PackageType::SwitchScenePage), 1);
        assert_eq!(u8::from(PackageType::CleanDraw), 2);
        assert_eq!(u8::from(PackageType::ScenePageData), 3);
        assert_eq!(u8::from(PackageType::KeyFrame), 4);
        assert_eq!(u8::from(PackageType::AddScene), 5);
        assert_eq!(u8::from(PackageType::SceneData), 6);
        assert_eq!(u8::from(PackageType::EnableUserDraw), 7);
        assert_eq!(u8::from(PackageType::DeleteScene), 8);
        assert_eq!(u8::from(PackageType::ModifyScene), 9);
        assert_eq!(u8::from(PackageType::SceneOrderChange), 10);
        assert_eq!(u8::from(PackageType::PageChange), 11);
        assert_eq!(u8::from(PackageType::Extension), 12);
    }

    #[test]
    fn test_unknown_type_code_rejected() {
        assert!(PackageType::try_from(13).is_err());
        assert!(PackageType::try_from(255).is_err());
    }

    #[test]
    fn test_extension_roundtrip() {
        let pkg = Package::extension(0, 0, 12, "laser-pointer:on");
        let decoded = Package::decode(&pkg.encode().unwrap()).unwrap();
        assert_eq!(decoded.extension_text().unwrap(), "laser-pointer:on");
    }

    #[test]
    fn test_empty_draw() {
        let pkg = Package::draw(0, 0, 0, Vec::new());
        let decoded = Package::decode(&pkg.encode().unwrap()).unwrap();
        assert!(decoded.draw_ops().unwrap().ops.is_empty());
    }

    #[test]
    fn test_default_transform() {
        let t = PageTransform::default();
        assert_eq!(t.angle, 0.0);
        assert_eq!(t.scale, 1.0);
        assert_eq!(t.move_x, 0.0);
        assert_eq!(t.move_y, 0.0);
    }
}

pub mod config;
pub mod detector;
pub mod device;
pub mod elements;
pub mod graph;
pub mod hub;
pub mod navigator;
pub mod popup;
pub mod replay;
pub mod search;
pub mod selector;
pub mod signature;
pub mod signatures;

pub use config::{DetectorConfig, HubConfig, NavigatorConfig, WatcherConfig};
pub use detector::{DetectionStats, ScreenDetector};
pub use device::{Device, DeviceError, DeviceProvider, ElementQuery, UiNode};
pub use graph::{ActionKind, NavigationAction, NavigationEdge, NavigationGraph};
pub use hub::{DeviceHub, DeviceSession, HubError};
pub use navigator::{NavigateOptions, NavigationResult, NavigationStatus, Navigator, RecoveryContext};
pub use popup::{PopupKind, PopupPattern, PopupWatcher};
pub use replay::ScriptedDevice;
pub use search::{KeywordSearch, ResultCategory, SearchOptions, SearchReport};
pub use signature::{ScreenDetectionResult, ScreenSignature, SignatureRegistry};

mod architecture;
mod network;
mod transfer;

pub use architecture::{ArchitectureOverrides, LayerWidths};
pub use network::{Activation, ActorNetwork, ActorNetworkConfig, NOISE_PARAM};
pub use transfer::{select_policy_parameters, TransferReport};

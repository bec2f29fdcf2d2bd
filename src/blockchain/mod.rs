pub mod contract;
pub mod ethereum;
pub mod listener;
pub mod source;

pub use contract::load_contract_abi;
pub use ethereum::EthersBlockSource;
pub use listener::{BlockListener, ListenerSettings};
pub use source::{BlockSource, ChainBlock, ChainTransaction};

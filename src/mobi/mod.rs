//! Palm database books: Mobipocket, PalmDoc and TealDoc.

mod doc;
pub mod filepos;
pub mod headers;
mod huffcdic;
mod palm;
mod palmdoc;
pub mod pdb;

pub use doc::MobiDoc;
pub use headers::{Compression, ExthHeader, MobiHeader};
pub use huffcdic::HuffCdicReader;
pub use palm::PalmDoc;
pub use pdb::{PdbKind, PdbReader};

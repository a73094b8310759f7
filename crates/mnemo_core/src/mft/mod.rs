//! MFT decoding: attributes, entries, flattened records and the streaming
//! parser over an extracted $MFT file.

pub mod attribute;
pub mod entry;
pub mod parser;
pub mod record;

#[cfg(test)]
pub(crate) mod testutil;

pub use attribute::{Attribute, AttributeBody, DataRun, FileNameAttr, StandardInfo};
pub use entry::{MftEntry, MFT_ENTRY_SIZE};
pub use parser::{MftParser, MftRecordIter};
pub use record::MftRecord;

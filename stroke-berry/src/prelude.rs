//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::meta::{read_scan_meta, HeaderReadError, ScanMeta};
pub use crate::data::window::CtWindow;
pub use crate::data::{RawScan, ReadScanError, RescalePolicy};

pub use crate::consts::label::{STROKE_NEGATIVE, STROKE_POSITIVE};
pub use crate::consts::{DEFAULT_SPLIT_SEED, NETWORK_INPUT_RESOLUTION, STANDARD_WINDOW_LEN};

pub use crate::transform::{
    preprocess_file, preprocess_scan, TransformConfig, TransformError,
};

pub use crate::dataset::assemble::{
    read_meta_table, read_scan_table, read_scan_table_flat, MetaFailure, MetaTable, ScanRecord,
};
pub use crate::dataset::materialize::{
    materialize, MaterializeError, SampleBatch, SampleFailure,
};
pub use crate::dataset::split::{stratified_split, SplitError, SplitRatios, SplitTables};

#[cfg(feature = "rayon")]
pub use crate::dataset::materialize::par_materialize;

pub use crate::dataset::{self, home_dataset_dir_with};

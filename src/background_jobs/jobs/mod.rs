mod staging_sweep;

pub use staging_sweep::StagingSweepJob;

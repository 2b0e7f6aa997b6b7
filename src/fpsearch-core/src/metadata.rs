use crate::error::{Error, Result};

/// Descriptive information about a collection of fingerprints.
///
/// `num_bytes` is always `ceil(num_bits / 8)`; `Metadata::new` enforces this
/// rather than trusting a caller-supplied value, since the two fields are
/// the same invariant chemfp's arena carries as a bare assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub num_bits: u32,
    pub num_bytes: u32,
    pub fp_type: String,
    pub software: String,
    pub sources: Vec<String>,
    pub date: String,
    pub aromaticity: Option<String>,
}

impl Metadata {
    pub fn new(num_bits: u32) -> Result<Self> {
        if num_bits == 0 {
            return Err(Error::InvalidHeader {
                reason: "num_bits must be positive".into(),
            });
        }
        Ok(Metadata {
            num_bits,
            num_bytes: num_bytes_for(num_bits),
            fp_type: String::new(),
            software: String::new(),
            sources: Vec::new(),
            date: String::new(),
            aromaticity: None,
        })
    }

    pub fn with_fp_type(mut self, fp_type: impl Into<String>) -> Self {
        self.fp_type = fp_type.into();
        self
    }

    pub fn with_software(mut self, software: impl Into<String>) -> Self {
        self.software = software.into();
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_aromaticity(mut self, aromaticity: impl Into<String>) -> Self {
        self.aromaticity = Some(aromaticity.into());
        self
    }

    pub fn matches_size(&self, other: &Metadata) -> bool {
        self.num_bits == other.num_bits && self.num_bytes == other.num_bytes
    }
}

pub fn num_bytes_for(num_bits: u32) -> u32 {
    num_bits.div_ceil(8)
}

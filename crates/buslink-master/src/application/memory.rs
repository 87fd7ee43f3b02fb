//! Guest RAM: a set of disjoint byte-backed regions.

use buslink_core::protocol::messages::MemoryRegion;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// No single RAM region covers the whole access.
    #[error("guest access of {length} bytes at {address:#x} is unmapped")]
    Unmapped { address: u64, length: u64 },

    #[error("RAM region at {base:#x} (size {size:#x}) overlaps an existing region or is empty")]
    Overlap { base: u64, size: u64 },
}

#[derive(Debug, Clone)]
struct RamRegion {
    region: MemoryRegion,
    data: Vec<u8>,
}

/// Guest physical memory built from RAM regions.
///
/// Accesses never straddle regions: an access is served only when a single
/// region contains all of it.
#[derive(Debug, Clone, Default)]
pub struct GuestMemory {
    regions: Vec<RamRegion>,
}

impl GuestMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds memory from `regions`, zero-filled.
    pub fn with_regions(regions: &[MemoryRegion]) -> Result<Self, MemoryError> {
        let mut memory = Self::new();
        for region in regions {
            memory.add_region(region.base, region.size)?;
        }
        Ok(memory)
    }

    /// Maps `size` bytes of zeroed RAM at `base`.
    pub fn add_region(&mut self, base: u64, size: u64) -> Result<(), MemoryError> {
        let region = MemoryRegion { base, size };
        let len = usize::try_from(size).map_err(|_| MemoryError::Overlap { base, size })?;
        if size == 0
            || base.checked_add(size).is_none()
            || self.regions.iter().any(|r| r.region.overlaps(&region))
        {
            return Err(MemoryError::Overlap { base, size });
        }
        self.regions.push(RamRegion {
            region,
            data: vec![0u8; len],
        });
        Ok(())
    }

    pub fn regions(&self) -> impl Iterator<Item = &MemoryRegion> {
        self.regions.iter().map(|r| &r.region)
    }

    /// Returns `true` when any RAM region shares a byte with `region`.
    pub fn overlaps(&self, region: &MemoryRegion) -> bool {
        self.regions.iter().any(|r| r.region.overlaps(region))
    }

    pub fn contains(&self, address: u64, length: u64) -> bool {
        self.find(address, length).is_some()
    }

    pub fn read(&self, address: u64, length: u32) -> Result<Vec<u8>, MemoryError> {
        let (index, offset) = self.locate(address, u64::from(length))?;
        let data = &self.regions[index].data;
        Ok(data[offset..offset + length as usize].to_vec())
    }

    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<(), MemoryError> {
        let (index, offset) = self.locate(address, bytes.len() as u64)?;
        self.regions[index].data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_u32(&self, address: u64) -> Result<u32, MemoryError> {
        let bytes = self.read(address, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn write_u32(&mut self, address: u64, value: u32) -> Result<(), MemoryError> {
        self.write(address, &value.to_le_bytes())
    }

    fn find(&self, address: u64, length: u64) -> Option<(usize, usize)> {
        self.regions.iter().enumerate().find_map(|(index, r)| {
            r.region
                .contains(address, length)
                .then(|| (index, (address - r.region.base) as usize))
        })
    }

    fn locate(&self, address: u64, length: u64) -> Result<(usize, usize), MemoryError> {
        self.find(address, length)
            .ok_or(MemoryError::Unmapped { address, length })
    }
}

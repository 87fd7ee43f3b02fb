//! The descriptor a device registers with.
//!
//! Limits are checked as the descriptor is built, so a descriptor that
//! exists always encodes.

use buslink_core::protocol::messages::{
    DeviceEndianness, MemoryRegion, RegisterRequest, SharedRegion, MAX_DESCRIPTION_LEN,
    MAX_MEMORY_REGIONS, MAX_NAME_LEN, MAX_SHARED_NAME_LEN, MAX_SHARED_REGIONS, PROTOCOL_VERSION,
};
use thiserror::Error;

/// Error type for descriptor construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("{field} is {len} bytes, limit is {max}")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("at most {max} {kind} regions may be registered")]
    TooManyRegions { kind: &'static str, max: usize },

    #[error("region at {base:#x} has zero size")]
    EmptyRegion { base: u64 },

    #[error("region at {base:#x} with size {size:#x} wraps the address space")]
    RegionOverflow { base: u64, size: u64 },
}

/// Identity and address map of a device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceDescriptor {
    vendor_id: u32,
    device_id: u32,
    name: String,
    description: String,
    endianness: DeviceEndianness,
    memory_regions: Vec<MemoryRegion>,
    shared_regions: Vec<SharedRegion>,
}

impl DeviceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identity fields.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError::TooLong`] if `name` exceeds 63 bytes or
    /// `description` exceeds 255 bytes. The descriptor is unchanged then.
    pub fn set_descriptor(
        &mut self,
        vendor_id: u32,
        device_id: u32,
        name: &str,
        description: &str,
    ) -> Result<&mut Self, DescriptorError> {
        check_len("name", name, MAX_NAME_LEN)?;
        check_len("description", description, MAX_DESCRIPTION_LEN)?;
        self.vendor_id = vendor_id;
        self.device_id = device_id;
        self.name = name.to_string();
        self.description = description.to_string();
        Ok(self)
    }

    /// Claims an MMIO region.
    ///
    /// # Errors
    ///
    /// Returns an error when 32 regions are already claimed or the region
    /// is empty or wraps past `u64::MAX`.
    pub fn add_memory_region(&mut self, base: u64, size: u64) -> Result<&mut Self, DescriptorError> {
        if self.memory_regions.len() >= MAX_MEMORY_REGIONS {
            return Err(DescriptorError::TooManyRegions {
                kind: "memory",
                max: MAX_MEMORY_REGIONS,
            });
        }
        check_region(base, size)?;
        self.memory_regions.push(MemoryRegion { base, size });
        Ok(self)
    }

    /// Claims the shared-memory region. Only one is allowed.
    pub fn add_shared_region(
        &mut self,
        base: u64,
        size: u64,
        name: &str,
    ) -> Result<&mut Self, DescriptorError> {
        if self.shared_regions.len() >= MAX_SHARED_REGIONS {
            return Err(DescriptorError::TooManyRegions {
                kind: "shared",
                max: MAX_SHARED_REGIONS,
            });
        }
        check_len("shared region name", name, MAX_SHARED_NAME_LEN)?;
        check_region(base, size)?;
        self.shared_regions.push(SharedRegion {
            base,
            size,
            name: name.to_string(),
        });
        Ok(self)
    }

    pub fn set_endianness(&mut self, endianness: DeviceEndianness) -> &mut Self {
        self.endianness = endianness;
        self
    }

    pub fn vendor_id(&self) -> u32 {
        self.vendor_id
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn endianness(&self) -> DeviceEndianness {
        self.endianness
    }

    pub fn memory_regions(&self) -> &[MemoryRegion] {
        &self.memory_regions
    }

    pub fn shared_regions(&self) -> &[SharedRegion] {
        &self.shared_regions
    }

    /// Returns `true` when `[address, address + length)` lies inside one of
    /// the claimed MMIO regions.
    pub fn decodes(&self, address: u64, length: u64) -> bool {
        self.memory_regions
            .iter()
            .any(|r| r.contains(address, length))
    }

    /// Builds the body of the `Register` request.
    pub fn to_register_request(&self) -> RegisterRequest {
        RegisterRequest {
            protocol_version: PROTOCOL_VERSION,
            vendor_id: self.vendor_id,
            device_id: self.device_id,
            endianness: self.endianness,
            name: self.name.clone(),
            description: self.description.clone(),
            memory_regions: self.memory_regions.clone(),
            shared_regions: self.shared_regions.clone(),
        }
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), DescriptorError> {
    if value.len() > max {
        return Err(DescriptorError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

fn check_region(base: u64, size: u64) -> Result<(), DescriptorError> {
    if size == 0 {
        return Err(DescriptorError::EmptyRegion { base });
    }
    if base.checked_add(size).is_none() {
        return Err(DescriptorError::RegionOverflow { base, size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_produces_register_request() {
        // Arrange
        let mut descriptor = DeviceDescriptor::new();

        // Act
        descriptor
            .set_descriptor(0x1AF4, 0x10, "uart", "16550 compatible")
            .unwrap()
            .add_memory_region(0x1000, 0x10)
            .unwrap()
            .set_endianness(DeviceEndianness::Little);
        let request = descriptor.to_register_request();

        // Assert
        assert_eq!(request.protocol_version, PROTOCOL_VERSION);
        assert_eq!(request.vendor_id, 0x1AF4);
        assert_eq!(request.name, "uart");
        assert_eq!(request.memory_regions, vec![MemoryRegion { base: 0x1000, size: 0x10 }]);
        assert_eq!(request.endianness, DeviceEndianness::Little);
    }

    #[test]
    fn test_name_over_limit_is_rejected_and_descriptor_unchanged() {
        let mut descriptor = DeviceDescriptor::new();
        let long = "n".repeat(MAX_NAME_LEN + 1);

        let result = descriptor.set_descriptor(1, 2, &long, "");

        assert_eq!(
            result.unwrap_err(),
            DescriptorError::TooLong { field: "name", len: 64, max: 63 }
        );
        assert_eq!(descriptor.vendor_id(), 0);
        assert!(descriptor.name().is_empty());
    }

    #[test]
    fn test_name_at_limit_is_accepted() {
        let mut descriptor = DeviceDescriptor::new();
        let name = "n".repeat(MAX_NAME_LEN);
        assert!(descriptor.set_descriptor(1, 2, &name, "").is_ok());
    }

    #[test]
    fn test_thirty_third_memory_region_is_rejected() {
        let mut descriptor = DeviceDescriptor::new();
        for i in 0..MAX_MEMORY_REGIONS as u64 {
            descriptor.add_memory_region(0x1000 * (i + 1), 0x10).unwrap();
        }

        let result = descriptor.add_memory_region(0x100_0000, 0x10);

        assert!(matches!(result, Err(DescriptorError::TooManyRegions { kind: "memory", max: 32 })));
        assert_eq!(descriptor.memory_regions().len(), MAX_MEMORY_REGIONS);
    }

    #[test]
    fn test_second_shared_region_is_rejected() {
        let mut descriptor = DeviceDescriptor::new();
        descriptor.add_shared_region(0x8000_0000, 0x1000, "fb").unwrap();

        assert!(descriptor.add_shared_region(0x9000_0000, 0x1000, "fb2").is_err());
    }

    #[test]
    fn test_degenerate_regions_are_rejected() {
        let mut descriptor = DeviceDescriptor::new();
        assert_eq!(
            descriptor.add_memory_region(0x1000, 0).unwrap_err(),
            DescriptorError::EmptyRegion { base: 0x1000 }
        );
        assert!(matches!(
            descriptor.add_memory_region(u64::MAX, 2),
            Err(DescriptorError::RegionOverflow { .. })
        ));
    }

    #[test]
    fn test_decodes_checks_whole_access() {
        let mut descriptor = DeviceDescriptor::new();
        descriptor.add_memory_region(0x1000, 0x10).unwrap();

        assert!(descriptor.decodes(0x100C, 4));
        assert!(!descriptor.decodes(0x100E, 4));
        assert!(!descriptor.decodes(0x0FFF, 1));
    }
}

//! Sparse, region-based physical address space.
//!
//! A [`Memory`] is an ordered list of non-overlapping regions inside a
//! fixed span. RAM regions appear on demand: a write to an uncovered
//! address allocates (or extends) a [`NormalRegion`] on the configured
//! granule, so the emulator approximates an unbounded flat address space
//! without backing all of it. MMIO regions are installed explicitly and
//! route accesses to a device.
//!
//! Addresses are 48-bit; all address arithmetic is done in `u64`.

extern crate alloc;

use alloc::{boxed::Box, string::String, vec, vec::Vec};

use log::debug;

use crate::error::{AccessKind, EmulatorError, MemoryError, RegionError};

/// Physical address. 48 usable bits.
pub type Address = u64;

/// A memory-mapped device backing an [`MmioRegion`].
///
/// Offsets are relative to the region start. `read` must return exactly
/// `size` bytes; both calls may have device-side effects and must
/// complete synchronously.
pub trait MmioDevice {
    fn read(&mut self, offset: u64, size: u64) -> Vec<u8>;
    fn write(&mut self, offset: u64, data: &[u8]);
}

/// RAM region backed by a zero-filled buffer.
///
/// Resizable (grow only) and mergeable with an adjacent normal region;
/// never relocatable.
pub struct NormalRegion {
    start: Address,
    data: Vec<u8>,
}

impl NormalRegion {
    /// Create a zero-filled region.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(start: Address, size: u64) -> Self {
        assert!(size > 0, "Region size must be positive");
        Self {
            start,
            data: vec![0; size as usize],
        }
    }
}

/// MMIO region delegating to a device. Fixed geometry: not resizable,
/// not relocatable, not mergeable.
pub struct MmioRegion {
    start: Address,
    size: u64,
    name: String,
    device: Box<dyn MmioDevice>,
}

impl MmioRegion {
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(start: Address, size: u64, name: &str, device: Box<dyn MmioDevice>) -> Self {
        assert!(size > 0, "Region size must be positive");
        Self {
            start,
            size,
            name: String::from(name),
            device,
        }
    }

    /// Device name, stable for the life of the region.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A typed memory region. The two variants share one method surface;
/// capabilities are fixed per variant.
pub enum Region {
    Normal(NormalRegion),
    Mmio(MmioRegion),
}

impl core::fmt::Debug for Region {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Region::Normal(_) => write!(f, "Normal[0x{:x}, 0x{:x})", self.start(), self.end()),
            Region::Mmio(r) => write!(f, "Mmio({})[0x{:x}, 0x{:x})", r.name, self.start(), self.end()),
        }
    }
}

impl Region {
    /// Inclusive lower bound.
    pub fn start(&self) -> Address {
        match self {
            Region::Normal(r) => r.start,
            Region::Mmio(r) => r.start,
        }
    }

    /// Byte count.
    pub fn size(&self) -> u64 {
        match self {
            Region::Normal(r) => r.data.len() as u64,
            Region::Mmio(r) => r.size,
        }
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> Address {
        self.start() + self.size()
    }

    pub fn resizable(&self) -> bool {
        matches!(self, Region::Normal(_))
    }

    pub fn relocatable(&self) -> bool {
        false
    }

    pub fn mergeable(&self) -> bool {
        matches!(self, Region::Normal(_))
    }

    /// Whether `[addr, addr + size)` is fully inside the region.
    pub fn contains(&self, addr: Address, size: u64) -> bool {
        addr >= self.start() && addr + size <= self.end()
    }

    // Geometric predicates, all on half-open [start, start + size).

    pub fn is_overlap(&self, other: &Region) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }

    pub fn is_higher_than(&self, other: &Region) -> bool {
        self.start() >= other.end()
    }

    pub fn is_lower_than(&self, other: &Region) -> bool {
        self.end() <= other.start()
    }

    /// True when this region ends exactly where `other` starts.
    pub fn is_align_lower(&self, other: &Region) -> bool {
        self.end() == other.start()
    }

    /// True when this region starts exactly where `other` ends.
    pub fn is_align_higher(&self, other: &Region) -> bool {
        self.start() == other.end()
    }

    /// True when `addr` lies entirely above the region.
    pub fn is_address_higher(&self, addr: Address) -> bool {
        addr >= self.end()
    }

    /// True when `addr` lies entirely below the region.
    pub fn is_address_lower(&self, addr: Address) -> bool {
        addr < self.start()
    }

    /// Read `size` bytes at `addr`. MMIO reads reach the device and may
    /// have side effects.
    pub fn read(&mut self, addr: Address, size: u64) -> Result<Vec<u8>, RegionError> {
        self.check_range(addr, size)?;
        match self {
            Region::Normal(r) => {
                let offset = (addr - r.start) as usize;
                Ok(r.data[offset..offset + size as usize].to_vec())
            }
            Region::Mmio(r) => {
                let reply = r.device.read(addr - r.start, size);
                if reply.len() as u64 != size {
                    return Err(RegionError::DeviceReply {
                        name: r.name.clone(),
                        got: reply.len() as u64,
                        want: size,
                    });
                }
                Ok(reply)
            }
        }
    }

    /// Write `data` at `addr`.
    pub fn write(&mut self, addr: Address, data: &[u8]) -> Result<(), RegionError> {
        self.check_range(addr, data.len() as u64)?;
        match self {
            Region::Normal(r) => {
                let offset = (addr - r.start) as usize;
                r.data[offset..offset + data.len()].copy_from_slice(data);
                Ok(())
            }
            Region::Mmio(r) => {
                r.device.write(addr - r.start, data);
                Ok(())
            }
        }
    }

    /// Grow the region to `new_size` bytes, zero-filling the extension.
    /// Shrinking is not supported; MMIO regions never resize.
    pub fn resize(&mut self, new_size: u64) -> Result<(), RegionError> {
        match self {
            Region::Normal(r) if new_size >= r.data.len() as u64 => {
                r.data.resize(new_size as usize, 0);
                Ok(())
            }
            _ => Err(RegionError::NotResizable {
                start: self.start(),
                size: self.size(),
                new_size,
            }),
        }
    }

    /// Neither region kind supports relocation.
    pub fn relocate(&mut self, _new_start: Address) -> Result<(), RegionError> {
        Err(RegionError::NotRelocatable {
            start: self.start(),
        })
    }

    /// Absorb `other`, which must start exactly at this region's end.
    /// Both regions must be mergeable.
    pub fn merge(&mut self, other: Region) -> Result<(), RegionError> {
        if !self.mergeable() || !other.mergeable() {
            return Err(RegionError::NotMergeable {
                start: self.start(),
                other: other.start(),
            });
        }
        if !self.is_align_lower(&other) {
            return Err(RegionError::NotAdjacent {
                start: self.start(),
                other: other.start(),
            });
        }
        match (self, other) {
            (Region::Normal(a), Region::Normal(b)) => {
                a.data.extend_from_slice(&b.data);
                Ok(())
            }
            // Unreachable: only normal regions are mergeable.
            (a, b) => Err(RegionError::NotMergeable {
                start: a.start(),
                other: b.start(),
            }),
        }
    }

    fn check_range(&self, addr: Address, size: u64) -> Result<(), RegionError> {
        if self.contains(addr, size) {
            Ok(())
        } else {
            Err(RegionError::OutOfRange {
                addr,
                size,
                start: self.start(),
                end: self.end(),
            })
        }
    }
}

/// Sparse physical address space.
#[derive(Debug)]
pub struct Memory {
    start: Address,
    size: u64,
    default_region_size: u64,
    regions: Vec<Region>,
}

impl Memory {
    /// Create an empty memory covering `[start, start + size)`.
    ///
    /// `default_region_size` is the write-allocation granule: a power of
    /// two that `start` and `size` must be multiples of.
    pub fn new(start: Address, size: u64, default_region_size: u64) -> Result<Self, EmulatorError> {
        if !default_region_size.is_power_of_two() {
            return Err(MemoryError::InvalidRegionSize {
                granule: default_region_size,
            }
            .into());
        }
        if start % default_region_size != 0 {
            return Err(MemoryError::UnalignedStart {
                start,
                granule: default_region_size,
            }
            .into());
        }
        if size == 0 || size % default_region_size != 0 {
            return Err(MemoryError::InvalidSize {
                size,
                granule: default_region_size,
            }
            .into());
        }
        Ok(Self {
            start,
            size,
            default_region_size,
            regions: Vec::new(),
        })
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Exclusive upper bound of the memory span.
    pub fn end(&self) -> Address {
        self.start + self.size
    }

    pub fn default_region_size(&self) -> u64 {
        self.default_region_size
    }

    /// The current regions, sorted by start address.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Insert a region, keeping the list sorted, non-overlapping and
    /// granule-aligned. A region adjacent to a mergeable neighbor is
    /// absorbed into it instead of being inserted.
    pub fn add_region(&mut self, region: Region) -> Result<(), EmulatorError> {
        let start = region.start();
        let end = region.end();
        if start < self.start || end > self.end() {
            return Err(RegionError::OutOfBounds {
                start,
                end,
                mem_start: self.start,
                mem_end: self.end(),
            }
            .into());
        }
        if start % self.default_region_size != 0 {
            return Err(RegionError::Misaligned {
                start,
                granule: self.default_region_size,
            }
            .into());
        }

        let idx = self.regions.partition_point(|r| r.start() < start);
        if idx > 0 && self.regions[idx - 1].is_overlap(&region) {
            return Err(RegionError::Overlap {
                start,
                end,
                other: self.regions[idx - 1].start(),
            }
            .into());
        }
        if idx < self.regions.len() && self.regions[idx].is_overlap(&region) {
            return Err(RegionError::Overlap {
                start,
                end,
                other: self.regions[idx].start(),
            }
            .into());
        }

        // Absorb into the lower neighbor when both sides merge.
        if idx > 0
            && self.regions[idx - 1].is_align_lower(&region)
            && self.regions[idx - 1].mergeable()
            && region.mergeable()
        {
            debug!("merging region at 0x{:x} into neighbor below", start);
            self.regions[idx - 1].merge(region)?;
            // The grown neighbor may now abut the region above it.
            if idx < self.regions.len()
                && self.regions[idx - 1].is_align_lower(&self.regions[idx])
                && self.regions[idx].mergeable()
            {
                let upper = self.regions.remove(idx);
                self.regions[idx - 1].merge(upper)?;
            }
            return Ok(());
        }

        // Absorb the upper neighbor into the new region.
        if idx < self.regions.len()
            && region.is_align_lower(&self.regions[idx])
            && region.mergeable()
            && self.regions[idx].mergeable()
        {
            debug!("merging neighbor above into region at 0x{:x}", start);
            let mut region = region;
            let upper = self.regions.remove(idx);
            region.merge(upper)?;
            self.regions.insert(idx, region);
            return Ok(());
        }

        self.regions.insert(idx, region);
        Ok(())
    }

    /// The unique region fully containing `[addr, addr + size)`.
    /// Cross-region accesses are not supported and fail.
    pub fn find_region(&self, addr: Address, size: u64) -> Result<&Region, EmulatorError> {
        self.regions
            .iter()
            .find(|r| r.contains(addr, size))
            .ok_or_else(|| RegionError::NotFound { addr, size }.into())
    }

    fn region_index(&self, addr: Address, size: u64) -> Option<usize> {
        self.regions.iter().position(|r| r.contains(addr, size))
    }

    fn check_access(addr: Address, size: u64, kind: AccessKind) -> Result<(), MemoryError> {
        if !matches!(size, 1 | 2 | 4 | 8) {
            return Err(MemoryError::InvalidAccessSize { size });
        }
        if addr % size != 0 {
            return Err(MemoryError::Misaligned { addr, size, kind });
        }
        Ok(())
    }

    /// Read `size` bytes (1, 2, 4 or 8; `addr` aligned to `size`).
    pub fn read(&mut self, addr: Address, size: u64) -> Result<Vec<u8>, EmulatorError> {
        Self::check_access(addr, size, AccessKind::Read)?;
        let idx = self
            .region_index(addr, size)
            .ok_or(RegionError::NotFound { addr, size })?;
        Ok(self.regions[idx].read(addr, size)?)
    }

    /// Write `data` (whose length must equal `size`) at `addr`, with the
    /// same shape rules as [`Memory::read`]. A write to an uncovered
    /// address allocates backing RAM first.
    pub fn write(&mut self, addr: Address, size: u64, data: &[u8]) -> Result<(), EmulatorError> {
        Self::check_access(addr, size, AccessKind::Write)?;
        if data.len() as u64 != size {
            return Err(MemoryError::PayloadSize {
                size,
                got: data.len() as u64,
            }
            .into());
        }
        if self.region_index(addr, size).is_none() {
            self.write_allocate(addr)?;
        }
        let idx = self
            .region_index(addr, size)
            .ok_or(MemoryError::AllocationBlocked { addr })?;
        Ok(self.regions[idx].write(addr, data)?)
    }

    /// Create or extend RAM so a write to `addr` has backing storage.
    ///
    /// Policy, in order: fresh granule-sized region when the memory is
    /// empty; extend the closest resizable region ending within one
    /// granule below the target; otherwise insert a fresh region on the
    /// granule, clipped so it abuts the neighbor above (merging when the
    /// neighbor allows it). Anything else is a blocked allocation.
    fn write_allocate(&mut self, addr: Address) -> Result<(), EmulatorError> {
        if addr < self.start || addr >= self.end() {
            return Err(MemoryError::OutOfBounds {
                addr,
                start: self.start,
                end: self.end(),
            }
            .into());
        }
        let granule = self.default_region_size;
        let aligned_start = addr & !(granule - 1);
        debug!(
            "write-allocating for 0x{:x} on granule base 0x{:x}",
            addr, aligned_start
        );

        if self.regions.is_empty() {
            return self.add_region(Region::Normal(NormalRegion::new(aligned_start, granule)));
        }

        // Closest region ending at or below the target address.
        let pred = self
            .regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_address_higher(addr))
            .max_by_key(|(_, r)| r.end())
            .map(|(i, _)| i);
        if let Some(i) = pred {
            let target_end = aligned_start + granule;
            let clear_above = match self.regions.get(i + 1) {
                Some(next) => next.start() >= target_end,
                None => true,
            };
            if addr - self.regions[i].end() < granule
                && self.regions[i].resizable()
                && clear_above
            {
                let new_size = target_end - self.regions[i].start();
                debug!(
                    "extending region at 0x{:x} to {} bytes",
                    self.regions[i].start(),
                    new_size
                );
                self.regions[i].resize(new_size)?;
                // The extension may have closed the gap to the region
                // above; coalesce so the space stays flat.
                if i + 1 < self.regions.len()
                    && self.regions[i].is_align_lower(&self.regions[i + 1])
                    && self.regions[i + 1].mergeable()
                {
                    let upper = self.regions.remove(i + 1);
                    self.regions[i].merge(upper)?;
                }
                return Ok(());
            }
        }

        // Fresh region on the granule, clipped against the first region
        // above the write address.
        let mut new_size = granule;
        if let Some(next) = self.regions.iter().find(|r| r.is_address_lower(addr)) {
            if next.start() < aligned_start + granule {
                new_size = next.start() - aligned_start;
            }
        }
        let region = Region::Normal(NormalRegion::new(aligned_start, new_size));
        self.add_region(region)
            .map_err(|_| MemoryError::AllocationBlocked { addr }.into())
    }

    // Fixed-size convenience forms.

    pub fn read_byte(&mut self, addr: Address) -> Result<Vec<u8>, EmulatorError> {
        self.read(addr, 1)
    }

    pub fn read_half_word(&mut self, addr: Address) -> Result<Vec<u8>, EmulatorError> {
        self.read(addr, 2)
    }

    pub fn read_word(&mut self, addr: Address) -> Result<Vec<u8>, EmulatorError> {
        self.read(addr, 4)
    }

    pub fn read_double_word(&mut self, addr: Address) -> Result<Vec<u8>, EmulatorError> {
        self.read(addr, 8)
    }

    pub fn write_byte(&mut self, addr: Address, data: &[u8]) -> Result<(), EmulatorError> {
        self.write(addr, 1, data)
    }

    pub fn write_half_word(&mut self, addr: Address, data: &[u8]) -> Result<(), EmulatorError> {
        self.write(addr, 2, data)
    }

    pub fn write_word(&mut self, addr: Address, data: &[u8]) -> Result<(), EmulatorError> {
        self.write(addr, 4, data)
    }

    pub fn write_double_word(&mut self, addr: Address, data: &[u8]) -> Result<(), EmulatorError> {
        self.write(addr, 8, data)
    }
}

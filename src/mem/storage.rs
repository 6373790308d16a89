use std::collections::HashMap;

use anyhow::bail;

const DEFAULT_UNIT_SIZE: u64 = 4096;

/// Sparse byte-addressable storage. Units are allocated on first touch and read back as zero
/// until written.
#[derive(Debug, Clone)]
pub struct Storage {
    capacity: u64,
    unit_size: u64,
    units: HashMap<u64, Vec<u8>>,
}

impl Storage {
    pub fn new(capacity: u64) -> Self {
        Self::with_unit_size(capacity, DEFAULT_UNIT_SIZE)
    }

    pub fn with_unit_size(capacity: u64, unit_size: u64) -> Self {
        assert!(unit_size > 0, "unit_size must be > 0");
        Self {
            capacity,
            unit_size,
            units: HashMap::new(),
        }
    }

    fn check_range(&self, addr: u64, n: u64) -> Result<(), anyhow::Error> {
        let end = addr.checked_add(n);
        match end {
            Some(end) if end <= self.capacity => Ok(()),
            _ => bail!(
                "access of {} bytes @ {:#x} exceeds storage capacity {:#x}",
                n,
                addr,
                self.capacity
            ),
        }
    }

    pub fn read(&self, addr: u64, n: u64) -> Result<Vec<u8>, anyhow::Error> {
        self.check_range(addr, n)?;
        let mut out = Vec::with_capacity(n as usize);
        let mut cur = addr;
        let end = addr + n;
        while cur < end {
            let base = cur - cur % self.unit_size;
            let offset = (cur - base) as usize;
            let take = ((base + self.unit_size).min(end) - cur) as usize;
            match self.units.get(&base) {
                Some(unit) => out.extend_from_slice(&unit[offset..offset + take]),
                None => out.resize(out.len() + take, 0),
            }
            cur += take as u64;
        }
        Ok(out)
    }

    pub fn write(&mut self, addr: u64, data: &[u8]) -> Result<(), anyhow::Error> {
        self.check_range(addr, data.len() as u64)?;
        let mut written = 0usize;
        while written < data.len() {
            let cur = addr + written as u64;
            let base = cur - cur % self.unit_size;
            let offset = (cur - base) as usize;
            let take = (self.unit_size as usize - offset).min(data.len() - written);
            let unit_size = self.unit_size as usize;
            let unit = self
                .units
                .entry(base)
                .or_insert_with(|| vec![0; unit_size]);
            unit[offset..offset + take].copy_from_slice(&data[written..written + take]);
            written += take;
        }
        Ok(())
    }

    /// Writes only the bytes whose mask flag is set.
    pub fn write_masked(
        &mut self,
        addr: u64,
        data: &[u8],
        mask: &[bool],
    ) -> Result<(), anyhow::Error> {
        if mask.len() != data.len() {
            bail!(
                "mask covers {} bytes but data has {} @ {:#x}",
                mask.len(),
                data.len(),
                addr
            );
        }
        let mut merged = self.read(addr, data.len() as u64)?;
        for (i, byte) in merged.iter_mut().enumerate() {
            if mask[i] {
                *byte = data[i];
            }
        }
        self.write(addr, &merged)
    }

    pub fn reset(&mut self) {
        self.units.clear();
    }
}

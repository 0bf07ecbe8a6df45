//! GUID Heap (`#GUID`)
//!
//! A plain array of 16 byte GUIDs addressed by one-based index; index `0` is the null GUID.
//!
//! # Reference
//! - [ECMA-335 II.24.2.5](https://ecma-international.org/wp-content/uploads/ECMA-335_6th_edition_june_2012.pdf)

use uguid::Guid;

use crate::{file::io::read_guid_at, Error::OutOfBounds, Result};

/// Read view over a `#GUID` heap
pub struct GuidHeap<'a> {
    data: &'a [u8],
}

impl<'a> GuidHeap<'a> {
    /// Create a view over `data`
    ///
    /// # Errors
    /// Returns an error if the length is not a multiple of 16
    pub fn from(data: &'a [u8]) -> Result<GuidHeap<'a>> {
        if data.len() % 16 != 0 {
            return Err(malformed_error!(
                "#GUID heap size {} is not a multiple of 16",
                data.len()
            ));
        }

        Ok(GuidHeap { data })
    }

    /// The GUID at one-based `index`, `None` for index `0`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the last GUID
    pub fn get(&self, index: usize) -> Result<Option<Guid>> {
        if index == 0 {
            return Ok(None);
        }
        if index > self.count() {
            return Err(OutOfBounds);
        }

        let mut offset = (index - 1) * 16;
        read_guid_at(self.data, &mut offset).map(Some)
    }

    /// Number of GUIDs stored
    #[must_use]
    pub fn count(&self) -> usize {
        self.data.len() / 16
    }
}

/// Builds a `#GUID` heap, storing every distinct GUID once
#[derive(Debug, Default)]
pub struct GuidBuilder {
    guids: Vec<Guid>,
}

impl GuidBuilder {
    /// An empty heap
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One-based index of `value`, `0` for `None`
    pub fn intern(&mut self, value: Option<Guid>) -> u32 {
        let Some(guid) = value else {
            return 0;
        };

        let position = match self.guids.iter().position(|g| *g == guid) {
            Some(position) => position,
            None => {
                self.guids.push(guid);
                self.guids.len() - 1
            }
        };
        position as u32 + 1
    }

    /// Size of the heap in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.guids.len() * 16
    }

    /// True if no GUID is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guids.is_empty()
    }

    /// The heap bytes
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.guids.iter().flat_map(|g| g.to_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uguid::guid;

    #[test]
    fn one_based() {
        let first = guid!("d437908e-65e6-487c-9735-7bdff699bea5");
        let second = guid!("00000000-0000-0000-0000-000000000001");

        let mut builder = GuidBuilder::new();
        assert_eq!(builder.intern(None), 0);
        assert_eq!(builder.intern(Some(first)), 1);
        assert_eq!(builder.intern(Some(second)), 2);
        assert_eq!(builder.intern(Some(first)), 1);

        let bytes = builder.into_bytes();
        let heap = GuidHeap::from(&bytes).unwrap();
        assert_eq!(heap.count(), 2);
        assert_eq!(heap.get(0).unwrap(), None);
        assert_eq!(heap.get(1).unwrap(), Some(first));
        assert_eq!(heap.get(2).unwrap(), Some(second));
        assert!(heap.get(3).is_err());
    }

    #[test]
    fn bad_size() {
        assert!(GuidHeap::from(&[0u8; 15]).is_err());
        assert_eq!(GuidHeap::from(&[]).unwrap().count(), 0);
    }
}

//! The MSF 7.0 multi-stream container.
//!
//! A PDB is a sequence of fixed-size pages. Page 0 holds the superblock: the magic, the page
//! size, the number of the active free page map, the page count and the size of the stream
//! directory, followed by the pages that list the pages of the directory. The directory
//! gives every stream's size and pages:
//!
//! ```text
//! u32 stream count
//! u32 size per stream (0xFFFFFFFF for an absent stream)
//! u32 page numbers of stream 0, of stream 1, ...
//! ```
//!
//! Within every interval of `page_size` pages, pages 1 and 2 are the two free page maps.

use crate::{
    file::{
        bitset::BitSet,
        io::{read_bytes_at, read_le_at, write_bytes_at, write_le_at},
    },
    Result,
};

/// Magic at the start of every MSF 7.0 file
pub const MSF_MAGIC: &[u8; 32] = b"Microsoft C/C++ MSF 7.00\r\n\x1aDS\0\0\0";

/// Page size of written files
pub const DEFAULT_PAGE_SIZE: u32 = 4096;

/// Directory size marking a stream as absent
const NIL_STREAM_SIZE: u32 = 0xFFFF_FFFF;

/// Bytes of the superblock before the directory page list
const SUPERBLOCK_SIZE: usize = 52;

/// The MSF superblock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsfHeader {
    /// Bytes per page
    pub page_size: u32,
    /// Active free page map, 1 or 2
    pub free_page_map: u32,
    /// Pages in the file
    pub page_count: u32,
    /// Bytes in the stream directory
    pub directory_size: u32,
}

impl MsfHeader {
    fn pages_for(&self, size: u32) -> usize {
        size.div_ceil(self.page_size) as usize
    }
}

/// Location of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamInfo {
    size: u32,
    pages: Vec<u32>,
}

/// Random access to the streams of an MSF file
#[derive(Debug)]
pub struct MsfReader<'a> {
    data: &'a [u8],
    header: MsfHeader,
    streams: Vec<Option<StreamInfo>>,
}

fn check_page(header: &MsfHeader, page: u32, what: &str) -> Result<()> {
    if page == 0 || page >= header.page_count {
        return Err(pdb_error!(
            "MSF",
            "{} refers to page {} of {}",
            what,
            page,
            header.page_count
        ));
    }
    Ok(())
}

fn gather(data: &[u8], header: &MsfHeader, pages: &[u32], size: u32, what: &str) -> Result<Vec<u8>> {
    let page_size = header.page_size as usize;
    let mut out = Vec::with_capacity(size as usize);

    for &page in pages {
        check_page(header, page, what)?;
        let want = (size as usize - out.len()).min(page_size);
        let mut offset = page as usize * page_size;
        let bytes = read_bytes_at(data, &mut offset, want)
            .map_err(|_| pdb_error!("MSF", "{} page {} is past the end of the file", what, page))?;
        out.extend_from_slice(bytes);
    }

    Ok(out)
}

impl<'a> MsfReader<'a> {
    /// Validate the superblock and load the stream directory
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] for a wrong magic, an invalid page size, a page number
    /// outside the file or a directory whose declared size does not match its contents
    pub fn open(data: &'a [u8]) -> Result<Self> {
        if data.len() < SUPERBLOCK_SIZE || &data[..MSF_MAGIC.len()] != MSF_MAGIC {
            return Err(pdb_error!("MSF", "not an MSF 7.0 file"));
        }

        let mut offset = MSF_MAGIC.len();
        let header = MsfHeader {
            page_size: read_le_at::<u32>(data, &mut offset)?,
            free_page_map: read_le_at::<u32>(data, &mut offset)?,
            page_count: read_le_at::<u32>(data, &mut offset)?,
            directory_size: read_le_at::<u32>(data, &mut offset)?,
        };
        let _reserved = read_le_at::<u32>(data, &mut offset)?;

        if !header.page_size.is_power_of_two() || !(512..=65536).contains(&header.page_size) {
            return Err(pdb_error!("MSF", "invalid page size {}", header.page_size));
        }
        if !matches!(header.free_page_map, 1 | 2) {
            log::warn!("MSF free page map {} is neither 1 nor 2", header.free_page_map);
        }
        if (data.len() as u64) < u64::from(header.page_count) * u64::from(header.page_size) {
            log::debug!(
                "MSF declares {} pages but the file holds {} bytes",
                header.page_count,
                data.len()
            );
        }

        let directory_pages = header.pages_for(header.directory_size);
        let list_size = (directory_pages * 4) as u32;
        let list_pages = header.pages_for(list_size);
        if SUPERBLOCK_SIZE + list_pages * 4 > header.page_size as usize {
            return Err(pdb_error!(
                "MSF",
                "directory of {} bytes does not fit the superblock",
                header.directory_size
            ));
        }

        let mut roots = Vec::with_capacity(list_pages);
        for _ in 0..list_pages {
            roots.push(read_le_at::<u32>(data, &mut offset)?);
        }
        let list = gather(data, &header, &roots, list_size, "directory page list")?;
        let mut pages = Vec::with_capacity(directory_pages);
        let mut list_offset = 0;
        for _ in 0..directory_pages {
            pages.push(read_le_at::<u32>(&list, &mut list_offset)?);
        }
        let directory = gather(data, &header, &pages, header.directory_size, "directory")?;

        let streams = Self::parse_directory(&header, &directory)?;
        log::debug!(
            "MSF: {} pages of {} bytes, {} streams",
            header.page_count,
            header.page_size,
            streams.len()
        );

        Ok(MsfReader {
            data,
            header,
            streams,
        })
    }

    fn parse_directory(header: &MsfHeader, directory: &[u8]) -> Result<Vec<Option<StreamInfo>>> {
        let truncated = |_| pdb_error!("MSF", "stream directory is truncated");
        let mut offset = 0;

        let count = read_le_at::<u32>(directory, &mut offset).map_err(truncated)? as usize;
        if count > directory.len() / 4 {
            return Err(pdb_error!("MSF", "directory declares {} streams", count));
        }

        let mut sizes = Vec::with_capacity(count);
        for _ in 0..count {
            sizes.push(read_le_at::<u32>(directory, &mut offset).map_err(truncated)?);
        }

        let mut streams = Vec::with_capacity(count);
        for size in sizes {
            if size == NIL_STREAM_SIZE {
                streams.push(None);
                continue;
            }

            let mut pages = Vec::with_capacity(header.pages_for(size));
            for _ in 0..header.pages_for(size) {
                let page = read_le_at::<u32>(directory, &mut offset).map_err(truncated)?;
                check_page(header, page, "stream directory")?;
                pages.push(page);
            }
            streams.push(Some(StreamInfo { size, pages }));
        }

        if offset != directory.len() {
            return Err(pdb_error!(
                "MSF",
                "stream directory uses {} of its {} bytes",
                offset,
                directory.len()
            ));
        }

        Ok(streams)
    }

    /// The superblock
    #[must_use]
    pub fn header(&self) -> &MsfHeader {
        &self.header
    }

    /// Number of directory entries, including absent streams
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Size of stream `index`, `None` if it is absent
    #[must_use]
    pub fn stream_size(&self, index: u32) -> Option<u32> {
        self.streams
            .get(index as usize)
            .and_then(|stream| stream.as_ref().map(|info| info.size))
    }

    /// Contents of stream `index`, `None` if it is absent
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] if one of its pages is outside the file
    pub fn try_read_stream(&self, index: u32) -> Result<Option<Vec<u8>>> {
        match self.streams.get(index as usize) {
            Some(Some(info)) => {
                let what = format!("stream {index}");
                gather(self.data, &self.header, &info.pages, info.size, &what).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Contents of stream `index`
    ///
    /// # Errors
    /// Returns [`crate::Error::Pdb`] if the stream is absent or one of its pages is outside
    /// the file
    pub fn read_stream(&self, index: u32) -> Result<Vec<u8>> {
        self.try_read_stream(index)?
            .ok_or_else(|| pdb_error!("MSF", "stream {} is absent", index))
    }
}

/// Lays streams out page by page
///
/// Pages are handed out sequentially and never reused, skipping the free page map pages of
/// every interval.
#[derive(Debug)]
pub struct MsfWriter {
    page_size: u32,
    data: Vec<u8>,
    page_count: u32,
    streams: Vec<Option<StreamInfo>>,
}

impl MsfWriter {
    /// A writer with `page_size` byte pages
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] unless `page_size` is a power of two from 512 to 4096
    pub fn new(page_size: u32) -> Result<Self> {
        if !page_size.is_power_of_two() || !(512..=4096).contains(&page_size) {
            return Err(malformed_error!("Invalid MSF page size {}", page_size));
        }

        Ok(MsfWriter {
            page_size,
            data: vec![0; 3 * page_size as usize],
            page_count: 3,
            streams: Vec::new(),
        })
    }

    /// Number of directory entries so far
    #[must_use]
    pub fn stream_count(&self) -> u32 {
        self.streams.len() as u32
    }

    fn is_free_page_map(&self, page: u32) -> bool {
        matches!(page % self.page_size, 1 | 2)
    }

    fn allocate_page(&mut self) -> u32 {
        while self.is_free_page_map(self.page_count) {
            self.page_count += 1;
        }
        let page = self.page_count;
        self.page_count += 1;
        self.data
            .resize(self.page_count as usize * self.page_size as usize, 0);
        page
    }

    fn write_pages(&mut self, bytes: &[u8]) -> Vec<u32> {
        let page_size = self.page_size as usize;
        let mut pages = Vec::with_capacity(bytes.len().div_ceil(page_size));
        for chunk in bytes.chunks(page_size) {
            let page = self.allocate_page();
            let mut offset = page as usize * page_size;
            write_bytes_at(&mut self.data, &mut offset, chunk);
            pages.push(page);
        }
        pages
    }

    fn stream_info(&mut self, bytes: &[u8]) -> Result<StreamInfo> {
        let size = u32::try_from(bytes.len())
            .ok()
            .filter(|&size| size != NIL_STREAM_SIZE)
            .ok_or_else(|| malformed_error!("Stream of {} bytes is too large", bytes.len()))?;
        Ok(StreamInfo {
            size,
            pages: self.write_pages(bytes),
        })
    }

    /// Store `bytes` as the next stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for streams of 4 GiB or more
    pub fn add_stream(&mut self, bytes: &[u8]) -> Result<u32> {
        let info = self.stream_info(bytes)?;
        self.streams.push(Some(info));
        Ok(self.stream_count() - 1)
    }

    /// Reserve the next stream index for [`MsfWriter::set_stream`]; until then it is empty
    pub fn reserve_stream(&mut self) -> u32 {
        self.streams.push(Some(StreamInfo {
            size: 0,
            pages: Vec::new(),
        }));
        self.stream_count() - 1
    }

    /// Add a directory entry for an absent stream
    pub fn add_nil_stream(&mut self) -> u32 {
        self.streams.push(None);
        self.stream_count() - 1
    }

    /// Fill a reserved stream
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `index` was never handed out
    pub fn set_stream(&mut self, index: u32, bytes: &[u8]) -> Result<()> {
        if index as usize >= self.streams.len() {
            return Err(malformed_error!("Stream {} was never reserved", index));
        }
        let info = self.stream_info(bytes)?;
        self.streams[index as usize] = Some(info);
        Ok(())
    }

    /// Write the directory, the free page map and the superblock
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the directory page list does not fit the
    /// superblock
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let mut directory = Vec::new();
        let mut offset = 0;
        write_le_at(&mut directory, &mut offset, self.streams.len() as u32);
        for stream in &self.streams {
            let size = stream.as_ref().map_or(NIL_STREAM_SIZE, |info| info.size);
            write_le_at(&mut directory, &mut offset, size);
        }
        for info in self.streams.iter().flatten() {
            for page in &info.pages {
                write_le_at(&mut directory, &mut offset, *page);
            }
        }

        let directory_pages = self.write_pages(&directory);
        let list: Vec<u8> = directory_pages
            .iter()
            .flat_map(|page| page.to_le_bytes())
            .collect();
        let roots = self.write_pages(&list);
        if SUPERBLOCK_SIZE + roots.len() * 4 > self.page_size as usize {
            return Err(malformed_error!(
                "MSF directory of {} bytes needs too many pages",
                directory.len()
            ));
        }

        self.write_free_page_map();

        let mut offset = 0;
        write_bytes_at(&mut self.data, &mut offset, MSF_MAGIC);
        write_le_at(&mut self.data, &mut offset, self.page_size);
        write_le_at(&mut self.data, &mut offset, 1u32);
        write_le_at(&mut self.data, &mut offset, self.page_count);
        write_le_at(&mut self.data, &mut offset, directory.len() as u32);
        write_le_at(&mut self.data, &mut offset, 0u32);
        for root in roots {
            write_le_at(&mut self.data, &mut offset, root);
        }

        log::debug!(
            "MSF: wrote {} streams in {} pages",
            self.streams.len(),
            self.page_count
        );
        Ok(self.data)
    }

    /// Mark every page past the end as free; a set bit is a free page
    fn write_free_page_map(&mut self) {
        let page_size = self.page_size as usize;
        let bits_per_page = page_size * 8;
        let intervals = (self.page_count as usize).div_ceil(page_size);
        let total_bits = intervals.max(1) * page_size;

        let mut free = BitSet::new(total_bits.max(bits_per_page));
        free.insert_range(self.page_count as usize, total_bits);

        let mut words = Vec::new();
        free.write_words(&mut words, &mut 0);
        for (interval, chunk) in words.chunks(page_size).enumerate() {
            for map in [1, 2] {
                let page = interval * page_size + map;
                if page < self.page_count as usize {
                    let mut offset = page * page_size;
                    write_bytes_at(&mut self.data, &mut offset, chunk);
                }
            }
        }
    }
}

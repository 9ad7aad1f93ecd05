//! Bring-up storage sink.
//!
//! The product's filesystem layer lives outside this firmware; the
//! pipeline only sees the [`BlockStorage`] boundary. This implementation
//! counts durable writes and reports them over the debug link so the
//! acquisition path can be exercised end to end on a bare board.

use core::convert::Infallible;

use voltlog_algo::pipeline::BlockStorage;

pub struct DebugStorage {
    blocks: u32,
    bytes: u32,
}

impl DebugStorage {
    pub fn new() -> Self {
        DebugStorage { blocks: 0, bytes: 0 }
    }
}

impl BlockStorage for DebugStorage {
    type Handle = ();
    type Error = Infallible;

    fn open(&mut self, name: &str) -> Result<(), Infallible> {
        defmt::info!("storage: open {}", name);
        self.blocks = 0;
        self.bytes = 0;
        Ok(())
    }

    fn write(&mut self, _handle: &mut (), bytes: &[u8]) -> Result<usize, Infallible> {
        self.blocks += 1;
        self.bytes += bytes.len() as u32;
        defmt::debug!("storage: block {} ({} bytes)", self.blocks, bytes.len());
        Ok(bytes.len())
    }

    fn close(&mut self, _handle: ()) -> Result<(), Infallible> {
        defmt::info!("storage: closed, {} bytes in {} blocks", self.bytes, self.blocks);
        Ok(())
    }
}


#[doc(hidden)]
pub(crate) mod helpers {
    use std::io::Cursor;
    use std::sync::Arc;

    use crate::block::WriteBlock;
    use crate::compression::{Codec, ZstdCodec};

    pub fn codec() -> Arc<dyn Codec> {
        Arc::new(ZstdCodec::default())
    }

    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    /// Writes one flushed block holding `data` at `base` and returns it.
    pub fn flushed_block(
        store: &mut Cursor<Vec<u8>>,
        base: u64,
        data: &[u8],
        block_size: usize,
    ) -> WriteBlock {
        let mut block = WriteBlock::new(0, base, block_size, codec()).unwrap();
        block.write(data).unwrap();
        block.compress(true).unwrap();
        block.cache_in(store, None).unwrap();
        block
    }
}

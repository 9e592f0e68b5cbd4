
#[doc(hidden)]
pub(crate) mod helpers {
    use std::io::Cursor;

    use crate::config::SessionConfig;
    use crate::session::Session;
    use crate::stream::WriteStream;

    pub fn session(workers: usize, block_size: usize) -> Session {
        Session::open(
            SessionConfig::default()
                .with_worker_threads(workers)
                .with_block_size(block_size),
        )
        .unwrap()
    }

    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 253) as u8).collect()
    }

    /// Writes `data` as a container at offset 0 and returns the store bytes.
    pub fn container(data: &[u8], session: &Session) -> Vec<u8> {
        let mut writer = WriteStream::create(Cursor::new(Vec::new()), 0, session).unwrap();
        writer.write(data).unwrap();
        writer.close().unwrap().into_inner()
    }
}

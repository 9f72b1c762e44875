use std::io;

/// Central error type.
#[derive(Debug)]
pub enum Error {
    /// file path that does not correspond to a module
    Module,
    /// revision of a file that was not loaded
    Revision(String),
    Io(io::Error),
    Tessera(tessera::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<tessera::Error> for Error {
    fn from(err: tessera::Error) -> Self {
        Self::Tessera(err)
    }
}

// ── Path classification ──

use crate::event::Endpoint;

const BOOT_CODE: &str = "/vl/bc.jsp";
const LOCATE: &str = "/vl/locate.jsp";
const POLL: &str = "/vl/p4.jsp";
const RFID: &str = "/vl/rfid.jsp";
const RECORD: &str = "/vl/record.jsp";
const CHOREOGRAPHY_PREFIX: &str = "/chorlibrary/";

/// What a request path asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Device firmware bootstrap.
    BootCode,
    /// Discovery: where is the server?
    Locate,
    /// Poll, RFID or recording upload.
    Device(Endpoint),
    /// A named choreography from the library.
    Choreography(String),
    /// Anything else: a file under the resources root, leading `/` removed.
    File(String),
}

impl Route {
    pub fn classify(path: &str) -> Self {
        match path {
            BOOT_CODE => Self::BootCode,
            LOCATE => Self::Locate,
            POLL => Self::Device(Endpoint::Poll),
            RFID => Self::Device(Endpoint::Rfid),
            RECORD => Self::Device(Endpoint::Record),
            _ => match path.strip_prefix(CHOREOGRAPHY_PREFIX) {
                Some(name) => Self::Choreography(name.to_owned()),
                None => Self::File(path.trim_start_matches('/').to_owned()),
            },
        }
    }
}

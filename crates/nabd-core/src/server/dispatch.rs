// ── Request dispatch ──
//
// Maps one parsed request to one response. Shared by every worker; holds
// no per-connection state.

use std::path::Path;
use std::sync::Arc;

use nabd_proto::{Request, Response};
use tracing::debug;

use super::route::Route;
use crate::burrow::Burrow;
use crate::config::ServerConfig;
use crate::error::CoreError;
use crate::event::DeviceRequest;
use crate::store::{ChoreographyLibrary, resource_path};

/// Boot code file, relative to the resources root.
pub const BOOT_CODE_FILE: &str = "bootcode.bin";

#[derive(Debug)]
pub struct Dispatcher {
    config: ServerConfig,
    burrow: Arc<Burrow>,
    library: Arc<ChoreographyLibrary>,
    locate_address: String,
}

impl Dispatcher {
    /// `locate_address` is the `host:port` announced to devices.
    pub fn new(
        config: ServerConfig,
        burrow: Arc<Burrow>,
        library: Arc<ChoreographyLibrary>,
        locate_address: String,
    ) -> Self {
        Self {
            config,
            burrow,
            library,
            locate_address,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the response for `request`.
    ///
    /// Lookup failures become a 404. A device request that does not
    /// validate is an error: the caller closes without answering.
    pub async fn respond(&self, request: &Request) -> Result<Response, CoreError> {
        let route = Route::classify(request.path());
        debug!(path = request.path(), ?route, "dispatching");

        match route {
            Route::BootCode => Ok(self.file(Path::new(BOOT_CODE_FILE)).await),
            Route::Locate => Ok(Response::ok(locate_body(&self.locate_address))),
            Route::Device(endpoint) => {
                let device_request = DeviceRequest::parse(endpoint, request)?;
                let packet = self
                    .burrow
                    .poll(&device_request, &self.config.resources_root)
                    .await;
                Ok(Response::ok(packet.encode()?))
            }
            Route::Choreography(name) => match self.library.get(&name) {
                Ok(choreography) => Ok(Response::ok(choreography.to_wire()?)),
                Err(err) => {
                    debug!("{err}");
                    Ok(Response::not_found())
                }
            },
            Route::File(path) => Ok(self.file(Path::new(&path)).await),
        }
    }

    async fn file(&self, relative: &Path) -> Response {
        let Some(path) = resource_path(&self.config.resources_root, relative) else {
            debug!(path = %relative.display(), "refusing path outside resources");
            return Response::not_found();
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Response::ok(bytes),
            Err(err) => {
                debug!(path = %path.display(), error = %err, "file not served");
                Response::not_found()
            }
        }
    }
}

fn locate_body(address: &str) -> String {
    format!("ping {address}\r\nbroad {address}\r\n\r\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use nabd_proto::{Choreography, Led, Packet, Status};
    use pretty_assertions::assert_eq;

    struct Fixture {
        dir: tempfile::TempDir,
        dispatcher: Dispatcher,
        burrow: Arc<Burrow>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            resources_root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let burrow = Arc::new(Burrow::new());
        let library = Arc::new(ChoreographyLibrary::new());
        let mut chor = Choreography::new("glow");
        chor.led_color(0, Led::Top, 1, 2, 3);
        library.register(chor);

        let dispatcher = Dispatcher::new(
            config,
            Arc::clone(&burrow),
            library,
            "10.0.0.2:8080".into(),
        );
        Fixture {
            dir,
            dispatcher,
            burrow,
        }
    }

    #[tokio::test]
    async fn locate_announces_address() {
        let f = fixture();
        let response = f.dispatcher.respond(&Request::get("/vl/locate.jsp")).await.unwrap();
        assert_eq!(
            response.body().as_ref(),
            b"ping 10.0.0.2:8080\r\nbroad 10.0.0.2:8080\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn boot_code_from_resources() {
        let f = fixture();
        let missing = f.dispatcher.respond(&Request::get("/vl/bc.jsp")).await.unwrap();
        assert_eq!(missing.status(), Status::NotFound);

        std::fs::write(f.dir.path().join("bootcode.bin"), b"\x7fboot").unwrap();
        let found = f.dispatcher.respond(&Request::get("/vl/bc.jsp")).await.unwrap();
        assert_eq!(found.status(), Status::Ok);
        assert_eq!(found.body().as_ref(), b"\x7fboot");
    }

    #[tokio::test]
    async fn poll_returns_encoded_packet() {
        let f = fixture();
        let response = f
            .dispatcher
            .respond(&Request::get("/vl/p4.jsp?sn=AB&tc=1&sd=0"))
            .await
            .unwrap();

        assert_eq!(response.body(), &Packet::idle(20).encode().unwrap());
        assert!(f.burrow.contains("ab"));
    }

    #[tokio::test]
    async fn malformed_device_request_is_an_error() {
        let f = fixture();
        let err = f
            .dispatcher
            .respond(&Request::get("/vl/p4.jsp?sn=AB&sd=x"))
            .await
            .unwrap_err();
        assert!(err.is_malformed());
        assert!(!f.burrow.contains("ab"));
    }

    #[tokio::test]
    async fn choreography_by_name() {
        let f = fixture();
        let found = f.dispatcher.respond(&Request::get("/chorlibrary/glow")).await.unwrap();
        let decoded = Choreography::from_wire("glow", found.body()).unwrap();
        assert_eq!(decoded.len(), 8);

        let missing = f.dispatcher.respond(&Request::get("/chorlibrary/nope")).await.unwrap();
        assert_eq!(missing.status(), Status::NotFound);
    }

    #[tokio::test]
    async fn files_stay_inside_resources() {
        let f = fixture();
        std::fs::create_dir_all(f.dir.path().join("sounds")).unwrap();
        std::fs::write(f.dir.path().join("sounds/a.mp3"), b"ID3").unwrap();

        let ok = f.dispatcher.respond(&Request::get("/sounds/a.mp3")).await.unwrap();
        assert_eq!(ok.body().as_ref(), b"ID3");

        let escape = f.dispatcher.respond(&Request::get("/../secret")).await.unwrap();
        assert_eq!(escape.status(), Status::NotFound);

        let missing = f.dispatcher.respond(&Request::get("/sounds/b.mp3")).await.unwrap();
        assert_eq!(missing.status(), Status::NotFound);
    }
}

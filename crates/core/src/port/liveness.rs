// Liveness marker port: signalled after every job attempt so outside monitors
// can tell a worker is still making progress.

use crate::error::Result;

pub trait LivenessMarker: Send + Sync {
    fn touch(&self) -> Result<()>;
}

//! Ad-hoc execution of a Python snippet in raw mode.

use std::time::Duration;

use tracing::warn;

use crate::Result;
use crate::deploy::{self, Phase};
use crate::session::{ExecOutput, Session, SessionConfig};
use crate::transport::Transport;

/// Opens `transport`, runs `code` in raw mode and closes again.
///
/// `timeout` is the idle window while the snippet runs. The port is closed
/// whether or not the snippet completes.
pub async fn run_snippet<T: Transport>(
    transport: &mut T,
    config: SessionConfig,
    code: &str,
    timeout: Duration,
) -> Result<ExecOutput> {
    let mut session = Session::open(transport, config)?;
    let result = async {
        deploy::enter_raw(&mut session, |_| {}).await?;
        session.set_phase(Phase::Executing);
        let output = session.exec(code, timeout).await?;
        deploy::exit_raw(&mut session).await?;
        Ok::<_, crate::Error>(output)
    }
    .await;

    match (result, session.close().await) {
        (Ok(output), closed) => closed.map(|()| output),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                warn!(error = %close_err, "close after failure");
            }
            Err(e)
        }
    }
}

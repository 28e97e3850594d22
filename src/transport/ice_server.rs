use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

const SCHEME_STUN: &str = "stun";
const SCHEME_STUNS: &str = "stuns";
const SCHEME_TURN: &str = "turn";
const SCHEME_TURNS: &str = "turns";

/// RTCIceServer describes a single STUN and TURN server that can be used by
/// the transport to establish a connection with a peer.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RTCIceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

impl RTCIceServer {
    pub(crate) fn validate(&self) -> Result<()> {
        self.urls()?;
        Ok(())
    }

    pub(crate) fn urls(&self) -> Result<Vec<Url>> {
        let mut urls = vec![];

        for url_str in &self.urls {
            let url = Url::parse(url_str)?;
            match url.scheme() {
                SCHEME_STUN | SCHEME_STUNS => {}
                SCHEME_TURN | SCHEME_TURNS => {
                    if self.username.is_empty() && self.credential.is_empty() {
                        return Err(Error::ErrNoTurnCredentials);
                    }
                    if self.username.is_empty() || self.credential.is_empty() {
                        return Err(Error::ErrTurnCredentials);
                    }
                }
                _ => return Err(Error::ErrInvalidIceServerUrl(url_str.clone())),
            }

            urls.push(url);
        }

        Ok(urls)
    }
}

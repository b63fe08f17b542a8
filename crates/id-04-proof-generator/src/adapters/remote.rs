//! # Remote Prover
//!
//! Delegates proving to an external service:
//!
//! ```text
//! POST {server}/api/v1/proof/generate
//!   {"circuit_name": "stateTransition", "inputs": {...}}
//! -> {"proof": {"pi_a": [..], "pi_b": [[..], ..], "pi_c": [..]}, "pub_signals": [..]}
//! ```
//!
//! Field elements travel as decimal strings. The call is bounded by the
//! configured response timeout.

use crate::domain::{ProofError, ProofResult, StateTransitionInputs, ZkProof};
use crate::ports::ZkGenerator;
use async_trait::async_trait;
use primitive_types::U256;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const CIRCUIT_NAME: &str = "stateTransition";

#[derive(Debug, Clone)]
pub struct RemoteProverConfig {
    pub server_url: String,
    pub response_timeout: Duration,
}

impl Default for RemoteProverConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8002".to_string(),
            response_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProverResponse {
    proof: ProofBody,
    pub_signals: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProofBody {
    pi_a: Vec<String>,
    pi_b: Vec<Vec<String>>,
    pi_c: Vec<String>,
}

pub struct RemoteProver {
    config: RemoteProverConfig,
    client: reqwest::Client,
}

impl RemoteProver {
    pub fn new(config: RemoteProverConfig) -> ProofResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.response_timeout)
            .build()
            .map_err(|e| ProofError::Transport(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        format!(
            "{}/api/v1/proof/generate",
            self.config.server_url.trim_end_matches('/')
        )
    }
}

fn field(value: &str) -> ProofResult<U256> {
    U256::from_dec_str(value)
        .map_err(|e| ProofError::MalformedResponse(format!("field element '{value}': {e:?}")))
}

fn pair(values: &[String]) -> ProofResult<[U256; 2]> {
    match values {
        [x, y, ..] => Ok([field(x)?, field(y)?]),
        _ => Err(ProofError::MalformedResponse(format!(
            "expected at least 2 coordinates, got {}",
            values.len()
        ))),
    }
}

fn parse_response(response: ProverResponse) -> ProofResult<ZkProof> {
    let ProofBody { pi_a, pi_b, pi_c } = response.proof;
    if pi_b.len() < 2 {
        return Err(ProofError::MalformedResponse("pi_b needs 2 rows".into()));
    }
    // The contract verifier expects each pi_b row with its coordinates swapped.
    let b0 = pair(&pi_b[0])?;
    let b1 = pair(&pi_b[1])?;
    Ok(ZkProof {
        a: pair(&pi_a)?,
        b: [[b0[1], b0[0]], [b1[1], b1[0]]],
        c: pair(&pi_c)?,
        public_signals: response
            .pub_signals
            .iter()
            .map(|s| field(s.as_str()))
            .collect::<ProofResult<_>>()?,
    })
}

#[async_trait]
impl ZkGenerator for RemoteProver {
    async fn prove_state_transition(&self, inputs: &StateTransitionInputs) -> ProofResult<ZkProof> {
        let body = serde_json::json!({
            "circuit_name": CIRCUIT_NAME,
            "inputs": inputs.to_circuit_json(),
        });
        debug!(did = %inputs.identifier, url = %self.url(), "[id-04] Requesting remote proof");

        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProofError::Timeout(self.config.response_timeout)
                } else {
                    ProofError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(did = %inputs.identifier, %status, "[id-04] Remote prover rejected request");
            return Err(ProofError::ProofGenerationFailed(format!("{status}: {text}")));
        }

        let parsed: ProverResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ProofError::Timeout(self.config.response_timeout)
            } else {
                ProofError::MalformedResponse(e.to_string())
            }
        })?;
        let proof = parse_response(parsed)?;
        if proof.public_signals != inputs.public_signals() {
            return Err(ProofError::ProofGenerationFailed(
                "prover returned public signals for different inputs".into(),
            ));
        }
        Ok(proof)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::inputs::tests::inputs;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn prover_at(url: String, response_timeout: Duration) -> RemoteProver {
        RemoteProver::new(RemoteProverConfig {
            server_url: url,
            response_timeout,
        })
        .unwrap()
    }

    /// Read one HTTP request; returns its body.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a request");
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return String::from_utf8_lossy(&buf[end + 4..end + 4 + length]).to_string();
                }
            }
        }
    }

    /// Serve one request with `body`, handing the request body back.
    async fn serve_once(body: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let request = read_request(&mut stream).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
            request
        });
        (url, server)
    }

    fn canned_response(signals: &[U256]) -> String {
        serde_json::json!({
            "proof": {
                "pi_a": ["11", "12", "1"],
                "pi_b": [["13", "14"], ["15", "16"], ["1", "0"]],
                "pi_c": ["17", "18", "1"],
                "protocol": "groth16"
            },
            "pub_signals": signals.iter().map(|s| s.to_string()).collect::<Vec<_>>()
        })
        .to_string()
    }

    #[test]
    fn test_url() {
        let prover = RemoteProver::new(RemoteProverConfig {
            server_url: "http://prover:8002/".into(),
            response_timeout: Duration::from_secs(1),
        })
        .unwrap();
        assert_eq!(prover.url(), "http://prover:8002/api/v1/proof/generate");
    }

    #[test]
    fn test_parse_response_swaps_b() {
        let json = serde_json::json!({
            "proof": {
                "pi_a": ["1", "2", "1"],
                "pi_b": [["3", "4"], ["5", "6"], ["1", "0"]],
                "pi_c": ["7", "8", "1"],
                "protocol": "groth16"
            },
            "pub_signals": ["10", "20"]
        });
        let proof = parse_response(serde_json::from_value(json).unwrap()).unwrap();
        assert_eq!(proof.a, [U256::from(1), U256::from(2)]);
        assert_eq!(proof.b[0], [U256::from(4), U256::from(3)]);
        assert_eq!(proof.b[1], [U256::from(6), U256::from(5)]);
        assert_eq!(proof.public_signals, vec![U256::from(10), U256::from(20)]);
    }

    #[test]
    fn test_malformed_field_rejected() {
        let json = serde_json::json!({
            "proof": {"pi_a": ["x", "2"], "pi_b": [["3", "4"], ["5", "6"]], "pi_c": ["7", "8"]},
            "pub_signals": []
        });
        assert!(matches!(
            parse_response(serde_json::from_value(json).unwrap()),
            Err(ProofError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let prover = RemoteProver::new(RemoteProverConfig {
            server_url: "http://127.0.0.1:9".into(),
            response_timeout: Duration::from_secs(2),
        })
        .unwrap();
        let err = prover.prove_state_transition(&inputs()).await.unwrap_err();
        assert!(matches!(err, ProofError::Transport(_) | ProofError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await;
            // Hold the connection open without answering.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let timeout = Duration::from_millis(300);
        let prover = prover_at(url, timeout);
        let started = std::time::Instant::now();
        let err = prover.prove_state_transition(&inputs()).await.unwrap_err();
        assert!(matches!(err, ProofError::Timeout(t) if t == timeout), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
        server.abort();
    }

    #[tokio::test]
    async fn test_round_trip_with_prover_service() {
        let inputs = inputs();
        let (url, server) = serve_once(canned_response(&inputs.public_signals())).await;

        let proof = prover_at(url, Duration::from_secs(5))
            .prove_state_transition(&inputs)
            .await
            .unwrap();
        assert_eq!(proof.a, [U256::from(11), U256::from(12)]);
        assert_eq!(
            proof.b,
            [[U256::from(14), U256::from(13)], [U256::from(16), U256::from(15)]]
        );
        assert_eq!(proof.c, [U256::from(17), U256::from(18)]);
        assert_eq!(proof.public_signals, inputs.public_signals());

        let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(request["circuit_name"], CIRCUIT_NAME);
        assert_eq!(request["inputs"], inputs.to_circuit_json());
    }

    #[tokio::test]
    async fn test_signals_for_other_inputs_rejected() {
        let (url, server) = serve_once(canned_response(&[U256::from(1), U256::from(2)])).await;
        let err = prover_at(url, Duration::from_secs(5))
            .prove_state_transition(&inputs())
            .await
            .unwrap_err();
        assert!(matches!(err, ProofError::ProofGenerationFailed(_)));
        server.await.unwrap();
    }
}

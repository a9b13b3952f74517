//! The proving boundary
//!
//! The engine never runs Groth16 itself; it hands a [`CircuitWitness`]
//! to whatever [`Prover`] the embedding application supplies (a snarkjs
//! sidecar, an FFI backend, a remote service) and gets back 256 proof
//! bytes plus the public signals. Public inputs are used exactly as the
//! prover returned them — byte-exact verifier compatibility beats local
//! recomputation — but are cross-checked first; a disagreement is a
//! fatal error, never silently ignored.
//!
//! Proof layout: `pi_a (64) || pi_b (128) || pi_c (64)`, with each G2
//! limb pair of `pi_b` written y,x as the BN254 pairing convention
//! requires.

use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;
use yacoin_epoch_pool::PROOF_SIZE;

use crate::error::{WalletError, WalletResult};
use crate::witness::CircuitWitness;

/// The three spending circuits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CircuitKind {
    Withdraw,
    Transfer,
    Renew,
}

impl CircuitKind {
    pub const ALL: [CircuitKind; 3] =
        [CircuitKind::Withdraw, CircuitKind::Transfer, CircuitKind::Renew];

    /// Artifact base name
    pub fn name(&self) -> &'static str {
        match self {
            CircuitKind::Withdraw => "withdraw",
            CircuitKind::Transfer => "transfer",
            CircuitKind::Renew => "renew",
        }
    }

    /// Number of public inputs this circuit exposes
    pub fn public_input_count(&self) -> usize {
        match self {
            CircuitKind::Withdraw => 7,
            CircuitKind::Transfer => 8,
            CircuitKind::Renew => 8,
        }
    }

    fn wasm_env(&self) -> &'static str {
        match self {
            CircuitKind::Withdraw => "WITHDRAW_WASM_PATH",
            CircuitKind::Transfer => "TRANSFER_WASM_PATH",
            CircuitKind::Renew => "RENEW_WASM_PATH",
        }
    }

    fn zkey_env(&self) -> &'static str {
        match self {
            CircuitKind::Withdraw => "WITHDRAW_ZKEY_PATH",
            CircuitKind::Transfer => "TRANSFER_ZKEY_PATH",
            CircuitKind::Renew => "RENEW_ZKEY_PATH",
        }
    }
}

impl std::fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Witness generator and proving key locations for one circuit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CircuitArtifacts {
    pub wasm_path: PathBuf,
    pub zkey_path: PathBuf,
}

impl CircuitArtifacts {
    /// Default locations, overridable per circuit via
    /// `<KIND>_WASM_PATH` / `<KIND>_ZKEY_PATH`
    pub fn resolve(kind: CircuitKind) -> Self {
        let wasm_path = std::env::var(kind.wasm_env())
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(format!("circuits/{}.wasm", kind.name())));
        let zkey_path = std::env::var(kind.zkey_env())
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(format!("circuits/{}_final.zkey", kind.name())));
        Self {
            wasm_path,
            zkey_path,
        }
    }

    /// Both files must exist before proving can start
    pub fn ensure_available(&self, kind: CircuitKind) -> WalletResult<()> {
        if !self.wasm_path.exists() || !self.zkey_path.exists() {
            return Err(WalletError::ArtifactsUnavailable(format!(
                "{kind}: {} / {}",
                self.wasm_path.display(),
                self.zkey_path.display()
            )));
        }
        Ok(())
    }
}

/// Proof bytes and public signals as the prover emitted them
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofBundle {
    pub proof: [u8; PROOF_SIZE],
    pub public_inputs: Vec<[u8; 32]>,
}

/// Capability that turns a witness into a proof
#[async_trait]
pub trait Prover: Send + Sync {
    async fn prove(&self, witness: &CircuitWitness) -> WalletResult<ProofBundle>;
}

/// Whether `MOCK_PROOFS=1` asked for zeroed proofs (tests only)
pub fn mock_proofs_enabled() -> bool {
    matches!(std::env::var("MOCK_PROOFS").as_deref(), Ok("1"))
}

/// Zeroed-proof prover for tests and dry runs.
///
/// Proof bytes are all zero; public inputs are the canonical ones from
/// the witness, so everything downstream of the prover stays honest.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockProver;

impl MockProver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Prover for MockProver {
    async fn prove(&self, witness: &CircuitWitness) -> WalletResult<ProofBundle> {
        debug!(circuit = %witness.circuit, "mock proving");
        Ok(ProofBundle {
            proof: [0u8; PROOF_SIZE],
            public_inputs: witness.public_inputs.clone(),
        })
    }
}

/// Fatal cross-check between the prover's public signals and the
/// locally assembled ones
pub fn check_public_inputs(witness: &CircuitWitness, bundle: &ProofBundle) -> WalletResult<()> {
    if bundle.public_inputs.len() != witness.circuit.public_input_count() {
        return Err(WalletError::PublicInputMismatch(format!(
            "{}: expected {} public inputs, prover returned {}",
            witness.circuit,
            witness.circuit.public_input_count(),
            bundle.public_inputs.len()
        )));
    }

    for (index, (ours, theirs)) in witness
        .public_inputs
        .iter()
        .zip(&bundle.public_inputs)
        .enumerate()
    {
        if ours != theirs {
            return Err(WalletError::PublicInputMismatch(format!(
                "{}: public input {index} diverged (local {}, prover {})",
                witness.circuit,
                hex::encode(ours),
                hex::encode(theirs)
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::witness::SignalTable;

    fn witness(kind: CircuitKind, publics: usize) -> CircuitWitness {
        CircuitWitness {
            circuit: kind,
            signals: SignalTable::new(),
            public_inputs: vec![[1u8; 32]; publics],
        }
    }

    #[test]
    fn test_default_artifact_paths() {
        let artifacts = CircuitArtifacts::resolve(CircuitKind::Withdraw);
        assert_eq!(artifacts.wasm_path, PathBuf::from("circuits/withdraw.wasm"));
        assert_eq!(artifacts.zkey_path, PathBuf::from("circuits/withdraw_final.zkey"));
    }

    #[test]
    fn test_missing_artifacts_reported() {
        let artifacts = CircuitArtifacts {
            wasm_path: PathBuf::from("/nonexistent/withdraw.wasm"),
            zkey_path: PathBuf::from("/nonexistent/withdraw_final.zkey"),
        };
        assert!(matches!(
            artifacts.ensure_available(CircuitKind::Withdraw),
            Err(WalletError::ArtifactsUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_prover_passes_through_publics() {
        let w = witness(CircuitKind::Withdraw, 7);
        let bundle = MockProver::new().prove(&w).await.unwrap();
        assert_eq!(bundle.proof, [0u8; PROOF_SIZE]);
        assert_eq!(bundle.public_inputs, w.public_inputs);
        assert!(check_public_inputs(&w, &bundle).is_ok());
    }

    #[test]
    fn test_public_input_count_checked() {
        let w = witness(CircuitKind::Transfer, 8);
        let bundle = ProofBundle {
            proof: [0u8; PROOF_SIZE],
            public_inputs: vec![[1u8; 32]; 7],
        };
        assert!(matches!(
            check_public_inputs(&w, &bundle),
            Err(WalletError::PublicInputMismatch(_))
        ));
    }

    #[test]
    fn test_public_input_divergence_is_fatal() {
        let w = witness(CircuitKind::Renew, 8);
        let mut bundle = ProofBundle {
            proof: [0u8; PROOF_SIZE],
            public_inputs: w.public_inputs.clone(),
        };
        bundle.public_inputs[3] = [2u8; 32];
        assert!(matches!(
            check_public_inputs(&w, &bundle),
            Err(WalletError::PublicInputMismatch(_))
        ));
    }
}

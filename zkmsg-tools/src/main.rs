mod config;
mod store;

use std::{
    fmt, fs,
    path::PathBuf,
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{ensure, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use halo2curves_axiom::bn256::Fr;
use serde::Serialize;
use tracing::{info, warn};
use zkmsg_common::{
    fr_from_bytes, fr_from_hex, fr_to_bytes, fr_to_hex, key_of, load_prover_artifacts,
    serialize_params, serialize_proving_key, serialize_verifying_key, write_manifest,
    ArtifactFile, ArtifactManifest, Flags, Identity, Payload, PayloadCodec, ProverArtifacts,
    SlotValue, CIRCUIT_VERSION, MANIFEST_FILE, MANIFEST_VERSION,
};
use zkmsg_prover::{setup, Halo2ProofSystem};
use zkmsg_state::{
    DigestProofSystem, OffChainMirror, ProofChecker, Transition, TransitionProver, Verifier,
    VerifierRecord, VerifierSnapshot,
};

use crate::{config::ToolsConfig, store::StateStore};

const DEFAULT_OUTPUT_DIR: &str = "artifacts/local";
const PARAMS_FILENAME: &str = "params.bin";
const VK_FILENAME: &str = "vk.bin";
const PK_FILENAME: &str = "pk.bin";

#[derive(Parser)]
#[command(
    name = "zkmsg-tools",
    about = "Utility commands for admission-gated message deposits"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate params/vk/pk and a manifest for the transition circuit.
    GenParams(GenParamsArgs),
    /// Print metadata about params.bin based on the manifest path.
    DumpParams(DumpArgs),
    /// Print metadata about vk.bin based on the manifest path.
    DumpVk(DumpArgs),
    /// Print the map key of a SEC1 encoded secp256k1 public key.
    KeyOf {
        #[arg(value_parser = parse_identity)]
        pubkey: Identity,
    },
    /// Pack data and flags into a payload scalar.
    Encode(PayloadArgs),
    /// Split a payload scalar into data and flags and validate it.
    Decode {
        /// Payload as printed by `encode`.
        payload: String,
        #[arg(long)]
        json: bool,
    },
    /// Drive a local verifier and its off-chain mirror.
    #[command(subcommand)]
    Mirror(MirrorCommand),
}

#[derive(Args)]
struct GenParamsArgs {
    /// Circuit k parameter (log2 of circuit size). Defaults to ZKMSG_DEFAULT_K.
    #[arg(long)]
    k: Option<u32>,
    /// Output directory for artifacts.
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
    /// Circuit version number.
    #[arg(long, default_value_t = CIRCUIT_VERSION)]
    circuit_version: u32,
}

#[derive(Args)]
struct DumpArgs {
    /// Defaults to ZKMSG_MANIFEST.
    #[arg(long)]
    manifest: Option<PathBuf>,
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PayloadArgs {
    /// Decimal or 0x-prefixed big-endian hex.
    #[arg(long, value_parser = parse_scalar)]
    data: Fr,
    /// Six flag bits, f1 first (e.g. 100000).
    #[arg(long, value_parser = parse_flags, default_value = "000000")]
    flags: Flags,
    /// Commit to a hash of the data instead of the data itself.
    #[arg(long)]
    obscured: bool,
}

#[derive(Subcommand)]
enum MirrorCommand {
    /// Deploy a fresh verifier and an empty mirror into the state dir.
    Init {
        #[arg(long, value_parser = parse_identity)]
        admin: Identity,
    },
    /// Admit `address` as an eligible participant.
    Register {
        #[arg(long, value_parser = parse_identity)]
        caller: Identity,
        #[arg(long, value_parser = parse_identity)]
        address: Identity,
        #[arg(long, value_enum, default_value_t = Backend::Digest)]
        backend: Backend,
    },
    /// Deposit the single message of an eligible participant.
    Deposit {
        #[arg(long, value_parser = parse_identity)]
        sender: Identity,
        #[command(flatten)]
        payload: PayloadArgs,
        #[arg(long, value_enum, default_value_t = Backend::Digest)]
        backend: Backend,
    },
    /// Print the mirror contents.
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Replay the verifier transcript into the mirror.
    Sync {
        /// Discard the mirror and rebuild it from the full transcript.
        #[arg(long)]
        rebuild: bool,
    },
}

/// Proof backend used for mirror transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Statement digests; binds proofs to statements but proves nothing.
    Digest,
    /// KZG proofs over the artifacts named by ZKMSG_MANIFEST.
    Halo2,
}

trait ProofBackend: TransitionProver + ProofChecker {}

impl<T: TransitionProver + ProofChecker> ProofBackend for T {}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zkmsg_tools=info,zkmsg_state=info".into()),
        )
        .init();

    let config = ToolsConfig::from_env()?;
    let cli = Cli::parse();
    match cli.command {
        Commands::GenParams(args) => gen_params(&config, args),
        Commands::DumpParams(args) => dump_params(&config, args),
        Commands::DumpVk(args) => dump_vk(&config, args),
        Commands::KeyOf { pubkey } => {
            println!("{}", key_of(&pubkey));
            Ok(())
        }
        Commands::Encode(args) => {
            println!("{}", fr_to_hex(encode(&args)?.as_fr()));
            Ok(())
        }
        Commands::Decode { payload, json } => decode(&payload, json),
        Commands::Mirror(command) => run_mirror(&config, command),
    }
}

fn gen_params(config: &ToolsConfig, args: GenParamsArgs) -> Result<()> {
    let k = args.k.unwrap_or(config.default_k);
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;

    println!("Generating transition circuit artifacts (k={})...", k);
    println!("This may take several minutes...");

    let params = setup(k)?;
    let params_bytes = serialize_params(&params.params)?;
    let vk_bytes = serialize_verifying_key(&params.vk)?;
    let pk_bytes = serialize_proving_key(&params.pk)?;

    write_binary(args.output_dir.join(PARAMS_FILENAME), &params_bytes)?;
    write_binary(args.output_dir.join(VK_FILENAME), &vk_bytes)?;
    write_binary(args.output_dir.join(PK_FILENAME), &pk_bytes)?;

    let manifest = ArtifactManifest {
        manifest_version: MANIFEST_VERSION,
        circuit_version: args.circuit_version,
        k,
        created_at_unix: current_unix_timestamp(),
        params: ArtifactFile::from_bytes(PARAMS_FILENAME, &params_bytes),
        vk: ArtifactFile::from_bytes(VK_FILENAME, &vk_bytes),
        pk: ArtifactFile::from_bytes(PK_FILENAME, &pk_bytes),
    };

    let manifest_path = args.output_dir.join(MANIFEST_FILE);
    write_manifest(&manifest_path, &manifest)?;

    println!(
        "Generated artifacts for circuit v{} (k={}) at {}",
        manifest.circuit_version,
        manifest.k,
        args.output_dir.display()
    );
    println!("\nArtifact Summary:");
    for (name, file) in [
        (PARAMS_FILENAME, &manifest.params),
        (VK_FILENAME, &manifest.vk),
        (PK_FILENAME, &manifest.pk),
    ] {
        println!("  {}: {} bytes, blake3: {}", name, file.size, file.blake3);
    }
    Ok(())
}

fn dump_params(config: &ToolsConfig, args: DumpArgs) -> Result<()> {
    let manifest_path = args.manifest.unwrap_or_else(|| config.manifest_path.clone());
    let artifacts = load_artifacts(&manifest_path)?;
    let summary = ParamsSummary {
        manifest_path: manifest_path.display().to_string(),
        circuit_version: artifacts.manifest.circuit_version,
        manifest_version: artifacts.manifest.manifest_version,
        params_hash: artifacts.manifest.params.blake3.clone(),
        params_size: artifacts.manifest.params.size,
        k: artifacts.manifest.k,
        n: 1u64 << artifacts.manifest.k,
    };
    output_summary(&summary, args.json)
}

fn dump_vk(config: &ToolsConfig, args: DumpArgs) -> Result<()> {
    let manifest_path = args.manifest.unwrap_or_else(|| config.manifest_path.clone());
    let artifacts = load_artifacts(&manifest_path)?;
    let cs = artifacts.vk.cs();
    let summary = VkSummary {
        manifest_path: manifest_path.display().to_string(),
        circuit_version: artifacts.manifest.circuit_version,
        vk_hash: artifacts.manifest.vk.blake3.clone(),
        vk_size: artifacts.manifest.vk.size,
        num_instance_columns: cs.num_instance_columns(),
        num_advice_columns: cs.num_advice_columns(),
        num_fixed_columns: cs.num_fixed_columns(),
        num_gates: cs.gates().len(),
    };
    output_summary(&summary, args.json)
}

fn encode(args: &PayloadArgs) -> Result<Payload> {
    let payload = if args.obscured {
        PayloadCodec::construct_obscured(args.data, args.flags)?
    } else {
        PayloadCodec::construct(args.data, args.flags)?
    };
    Ok(payload)
}

fn decode(raw: &str, json: bool) -> Result<()> {
    let payload = Payload::from_fr(fr_from_hex(raw)?);
    let (data, flags) = PayloadCodec::decode(&payload);
    let summary = PayloadSummary {
        payload: fr_to_hex(payload.as_fr()),
        data: scalar_be_hex(&data),
        flags: format!("{:06b}", flags.bits()),
        slot: SlotValue::from_fr(*payload.as_fr()).kind().to_string(),
        error: PayloadCodec::validate(&payload)
            .err()
            .map(|err| err.to_string()),
    };
    output_summary(&summary, json)
}

fn run_mirror(config: &ToolsConfig, command: MirrorCommand) -> Result<()> {
    let store = StateStore::new(&config.state_dir);
    match command {
        MirrorCommand::Init { admin } => {
            let verifier = VerifierSnapshot {
                record: VerifierRecord::genesis(admin),
                events: Vec::new(),
                transcript: Vec::new(),
            };
            store.init(&verifier, &OffChainMirror::new(admin))?;
            println!("initialized state at {}", store.dir().display());
            Ok(())
        }
        MirrorCommand::Register {
            caller,
            address,
            backend,
        } => {
            let (snapshot, mut mirror) = store.load()?;
            let witness = mirror.set_eligible(&address, &caller)?;
            let transition = Transition::Register { witness };
            with_backend(config, backend, |system| {
                commit(&store, system, snapshot, mirror, &caller, transition)
            })
        }
        MirrorCommand::Deposit {
            sender,
            payload,
            backend,
        } => {
            let (snapshot, mut mirror) = store.load()?;
            let payload = encode(&payload)?;
            let witness = mirror.deposit_message(&sender, payload)?;
            let transition = Transition::DepositMessage { witness, payload };
            with_backend(config, backend, |system| {
                commit(&store, system, snapshot, mirror, &sender, transition)
            })
        }
        MirrorCommand::Show { json } => {
            let (snapshot, mirror) = store.load()?;
            show(&snapshot, &mirror, json)
        }
        MirrorCommand::Sync { rebuild } => {
            let (snapshot, mirror) = store.load()?;
            let mirror = if rebuild {
                OffChainMirror::rebuild(*mirror.admin(), &snapshot.transcript)?
            } else {
                let mut mirror = mirror;
                let applied = mirror.sync_from(&snapshot.transcript)?;
                println!("applied {} transcript entries", applied);
                mirror
            };
            mirror.assert_synced(&snapshot.record.root)?;
            store.save(&snapshot, &mirror)?;
            println!("mirror synced at root {}", fr_to_hex(&mirror.root()));
            Ok(())
        }
    }
}

fn with_backend<R>(
    config: &ToolsConfig,
    backend: Backend,
    run: impl FnOnce(&dyn ProofBackend) -> Result<R>,
) -> Result<R> {
    match backend {
        Backend::Digest => run(&DigestProofSystem),
        Backend::Halo2 => {
            let artifacts = load_artifacts(&config.manifest_path)?;
            run(&Halo2ProofSystem::from_artifacts(artifacts))
        }
    }
}

/// Proves `transition`, submits it to the verifier and persists both sides.
/// Nothing is written when the verifier refuses.
fn commit(
    store: &StateStore,
    system: &dyn ProofBackend,
    snapshot: VerifierSnapshot,
    mut mirror: OffChainMirror,
    sender: &Identity,
    transition: Transition,
) -> Result<()> {
    let mut verifier = Verifier::restore(snapshot, system);
    let statement = transition
        .statement(&verifier.root())
        .context("mirror witness does not match the verifier root; run `mirror sync`")?;
    let proof = system.prove(&statement, transition.witness())?;

    if let Err(err) = verifier.submit(sender, &transition, &proof) {
        warn!(category = ?err.category(), "verifier refused the transition");
        return Err(err.into());
    }

    mirror.sync_from(verifier.transcript())?;
    store.save(&verifier.snapshot(), &mirror)?;
    info!(
        key = %statement.key,
        root = %fr_to_hex(&verifier.root()),
        eligible_count = verifier.eligible_count(),
        "state saved"
    );
    println!("{}", fr_to_hex(&verifier.root()));
    Ok(())
}

fn show(snapshot: &VerifierSnapshot, mirror: &OffChainMirror, json: bool) -> Result<()> {
    let slots = mirror
        .map()
        .iter()
        .map(|entry| {
            let (key, value) = entry?;
            Ok(SlotSummary {
                key: key.to_string(),
                slot: SlotValue::from_fr(value).kind().to_string(),
                value: fr_to_hex(&value),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let summary = MirrorSummary {
        root: fr_to_hex(&mirror.root()),
        verifier_root: fr_to_hex(&snapshot.record.root),
        in_sync: mirror.assert_synced(&snapshot.record.root).is_ok(),
        eligible_count: mirror.eligible_count(),
        cursor: mirror.cursor(),
        events: snapshot.events.len(),
        slots,
    };
    output_summary(&summary, json)
}

fn parse_identity(value: &str) -> Result<Identity> {
    let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .context("public key must be hex")?;
    Identity::from_sec1(&bytes)
}

fn parse_scalar(value: &str) -> Result<Fr> {
    let Some(hex_str) = value.strip_prefix("0x") else {
        let small: u64 = value
            .parse()
            .with_context(|| format!("expected decimal or 0x hex, got {value:?}"))?;
        return Ok(Fr::from(small));
    };

    let padded = if hex_str.len() % 2 == 1 {
        format!("0{hex_str}")
    } else {
        hex_str.to_string()
    };
    let be = hex::decode(padded).context("invalid hex scalar")?;
    ensure!(be.len() <= 32, "scalar wider than 32 bytes");
    let mut le = [0u8; 32];
    for (dst, src) in le.iter_mut().zip(be.iter().rev()) {
        *dst = *src;
    }
    fr_from_bytes(&le)
}

fn parse_flags(value: &str) -> Result<Flags> {
    let bits = u8::from_str_radix(value.strip_prefix("0b").unwrap_or(value), 2)
        .with_context(|| format!("flags must be binary, got {value:?}"))?;
    Ok(Flags::from_bits(bits)?)
}

fn scalar_be_hex(value: &Fr) -> String {
    let mut be = fr_to_bytes(value);
    be.reverse();
    let encoded = hex::encode(be);
    let trimmed = encoded.trim_start_matches('0');
    format!("0x{}", if trimmed.is_empty() { "0" } else { trimmed })
}

fn write_binary(path: PathBuf, bytes: &[u8]) -> Result<()> {
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn load_artifacts(path: &PathBuf) -> Result<ProverArtifacts> {
    load_prover_artifacts(path)
        .with_context(|| format!("failed to load manifest {}", path.display()))
}

fn output_summary<T>(summary: &T, json: bool) -> Result<()>
where
    T: Serialize + fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}

#[derive(Serialize)]
struct ParamsSummary {
    manifest_path: String,
    circuit_version: u32,
    manifest_version: u32,
    params_hash: String,
    params_size: u64,
    k: u32,
    n: u64,
}

impl fmt::Display for ParamsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "manifest: {}", self.manifest_path)?;
        writeln!(f, "circuit_version: {}", self.circuit_version)?;
        writeln!(f, "manifest_version: {}", self.manifest_version)?;
        writeln!(f, "params_hash: {}", self.params_hash)?;
        writeln!(f, "params_size: {} bytes", self.params_size)?;
        writeln!(f, "k: {}", self.k)?;
        writeln!(f, "n: {}", self.n)
    }
}

#[derive(Serialize)]
struct VkSummary {
    manifest_path: String,
    circuit_version: u32,
    vk_hash: String,
    vk_size: u64,
    num_instance_columns: usize,
    num_advice_columns: usize,
    num_fixed_columns: usize,
    num_gates: usize,
}

impl fmt::Display for VkSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "manifest: {}", self.manifest_path)?;
        writeln!(f, "circuit_version: {}", self.circuit_version)?;
        writeln!(f, "vk_hash: {}", self.vk_hash)?;
        writeln!(f, "vk_size: {} bytes", self.vk_size)?;
        writeln!(f, "instance columns: {}", self.num_instance_columns)?;
        writeln!(f, "advice columns: {}", self.num_advice_columns)?;
        writeln!(f, "fixed columns: {}", self.num_fixed_columns)?;
        writeln!(f, "gates: {}", self.num_gates)
    }
}

#[derive(Serialize)]
struct PayloadSummary {
    payload: String,
    data: String,
    flags: String,
    slot: String,
    error: Option<String>,
}

impl fmt::Display for PayloadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "payload: {}", self.payload)?;
        writeln!(f, "data: {}", self.data)?;
        writeln!(f, "flags: {}", self.flags)?;
        writeln!(f, "slot: {}", self.slot)?;
        match &self.error {
            Some(err) => writeln!(f, "valid: no ({})", err),
            None => writeln!(f, "valid: yes"),
        }
    }
}

#[derive(Serialize)]
struct SlotSummary {
    key: String,
    slot: String,
    value: String,
}

#[derive(Serialize)]
struct MirrorSummary {
    root: String,
    verifier_root: String,
    in_sync: bool,
    eligible_count: u8,
    cursor: u64,
    events: usize,
    slots: Vec<SlotSummary>,
}

impl fmt::Display for MirrorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "root: {}", self.root)?;
        writeln!(f, "verifier root: {}", self.verifier_root)?;
        writeln!(f, "in sync: {}", self.in_sync)?;
        writeln!(f, "eligible: {}", self.eligible_count)?;
        writeln!(f, "cursor: {}", self.cursor)?;
        writeln!(f, "deposits: {}", self.events)?;
        for slot in &self.slots {
            writeln!(f, "  {} {} {}", slot.key, slot.slot, slot.value)?;
        }
        Ok(())
    }
}

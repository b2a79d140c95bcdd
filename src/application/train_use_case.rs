// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Runs every selected configuration back to back. Each run gets
// its own model state, cursor and optimisers; nothing is shared
// between runs except the read-only ConfigStore.
//
// Per configuration:
//
//   Step 1: Pretrained matrix (optional) (Layer 6 - infra)
//   Step 2: Run directory + config       (Layer 6 - infra)
//   Step 3: Load posts, split if needed  (Layer 4 - data)
//   Step 4: Build / load tokenizer       (Layer 6 - infra)
//   Step 5: Encode posts                 (Layer 4 - data)
//   Step 6: Dataset cursor               (Layer 4 - data)
//   Step 7: Graph builder → ModelState   (Layer 5 - ml)
//   Step 8: Pre-train, then train        (Layer 5 - ml)

use anyhow::{Context, Result};
use burn::{
    backend::{wgpu::WgpuDevice, Autodiff, Wgpu},
    optim::AdamConfig,
    tensor::backend::AutodiffBackend,
};
use std::path::{Path, PathBuf};

use crate::application::config::{ConfigStore, NetworkConfig};
use crate::data::{
    dataset::TitleCursor,
    encoding::PostEncoder,
    loader::JsonLinesLoader,
    splitter::split_train_val,
};
use crate::domain::traits::{DatasetCursor, PostSource};
use crate::infra::{
    embeddings::EmbeddingMatrix,
    run_dir::RunDirectory,
    tokenizer_store::TokenizerStore,
};
use crate::ml::{
    builder::GraphBuilder,
    model::AudienceNetwork,
    trainer::{Trainer, TrainingPhase, TrainingReport},
};

type TrainBackend = Autodiff<Wgpu>;

/// Share of the training file kept for training when no validation
/// file is configured.
const TRAIN_FRACTION: f64 = 0.8;

// ─── Request ──────────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct TrainRequest {
    /// JSON config store
    pub config_file: PathBuf,
    /// Run numbers to train, in order; empty means every config
    pub runs:        Vec<usize>,
    /// Parent of every run directory
    pub log_root:    PathBuf,
}

impl Default for TrainRequest {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("config.json"),
            runs:        Vec::new(),
            log_root:    PathBuf::from("logs"),
        }
    }
}

/// Outcome of one configuration.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub name:     String,
    pub log_dir:  PathBuf,
    pub pretrain: Option<TrainingReport>,
    pub main:     TrainingReport,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    request: TrainRequest,
}

impl TrainUseCase {
    pub fn new(request: TrainRequest) -> Self {
        Self { request }
    }

    /// Train on the default WGPU device.
    pub fn execute(&self) -> Result<Vec<RunSummary>> {
        let store  = ConfigStore::load(&self.request.config_file)?;
        let device = WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_with::<TrainBackend>(&store, device)
    }

    pub fn execute_with<B: AutodiffBackend>(
        &self,
        store:  &ConfigStore,
        device: B::Device,
    ) -> Result<Vec<RunSummary>> {
        let runs: Vec<usize> = if self.request.runs.is_empty() {
            (0..store.network.len()).collect()
        } else {
            self.request.runs.clone()
        };

        let mut summaries = Vec::with_capacity(runs.len());
        for index in runs {
            let config = store.get(index)?;
            tracing::info!("── Run #{} '{}' ──", index, config.name);
            let summary = run_config::<B>(store, config, &self.request.log_root, device.clone())
                .with_context(|| format!("Run #{} ('{}') failed", index, config.name))?;
            summaries.push(summary);
        }
        Ok(summaries)
    }
}

/// Train one configuration from its data files to its final checkpoint.
pub fn run_config<B: AutodiffBackend>(
    store:    &ConfigStore,
    config:   &NetworkConfig,
    log_root: &Path,
    device:   B::Device,
) -> Result<RunSummary> {
    let mut config = config.clone();

    // ── Step 1: Pretrained matrix decides the embedding shape ────────────────
    let matrix = if config.use_pretrained {
        let file = config
            .pre_trained_matrix
            .as_deref()
            .context("use_pretrained is set but pre_trained_matrix is missing")?;
        let matrix = EmbeddingMatrix::load(store.data_file(file))?;
        if matrix.rows() != config.vocabulary_size || matrix.cols() != config.embedding_size {
            tracing::info!(
                "Embedding table follows the pretrained matrix: {}×{} → {}×{}",
                config.vocabulary_size,
                config.embedding_size,
                matrix.rows(),
                matrix.cols()
            );
            config.vocabulary_size = matrix.rows();
            config.embedding_size  = matrix.cols();
        }
        Some(matrix)
    } else {
        None
    };
    config.validate()?;

    // ── Step 2: Run directory ─────────────────────────────────────────────────
    let run = RunDirectory::create(log_root, &config)?;

    // ── Step 3: Posts ─────────────────────────────────────────────────────────
    let loaded = JsonLinesLoader::new(store.data_file(&config.training_data)).load_all()?;
    let (train_posts, valid_posts) = match &config.validation_data {
        Some(file) => (loaded, JsonLinesLoader::new(store.data_file(file)).load_all()?),
        None       => split_train_val(loaded, TRAIN_FRACTION, config.seed),
    };
    tracing::info!(
        "Split: {} train, {} validation",
        train_posts.len(),
        valid_posts.len()
    );

    // ── Step 4: Tokenizer ─────────────────────────────────────────────────────
    let tok_store = TokenizerStore::new(run.root());
    let tokenizer = match &matrix {
        Some(m) => tok_store.build_from_words(m.words())?,
        None    => tok_store.load_or_build(
            train_posts.iter().map(|p| p.title.as_str()),
            config.vocabulary_size,
        )?,
    };

    // ── Step 5: Encode ────────────────────────────────────────────────────────
    let (users, subreddits) =
        PostEncoder::dictionaries(&train_posts, config.user_count, config.subreddit_count);
    tracing::info!(
        "Dictionaries: {} users, {} subreddits",
        users.len(),
        subreddits.len()
    );
    let encoder    = PostEncoder::new(tokenizer, users, subreddits, config.max_title_length);
    let training   = encoder.encode_all(&train_posts)?;
    let validation = encoder.encode_all(&valid_posts)?;

    // ── Step 6: Cursor ────────────────────────────────────────────────────────
    let cursor = TitleCursor::new(training, validation, config.batch_size, config.seed);

    // ── Step 7: Model ─────────────────────────────────────────────────────────
    let state = GraphBuilder::<B>::new(config.clone(), device).add_as_conf(run.root())?;

    // ── Step 8: Train ─────────────────────────────────────────────────────────
    let mut trainer = Trainer::new(
        state,
        cursor,
        AdamConfig::new().init::<B, AudienceNetwork<B>>(),
        AdamConfig::new().init::<B, AudienceNetwork<B>>(),
        matrix,
    );

    let pretrain = if config.pre_train_subreddit {
        Some(trainer.train(TrainingPhase::Pretrain)?)
    } else {
        None
    };
    let main = trainer.train(TrainingPhase::Main)?;
    tracing::info!(
        "'{}' stopped at epoch {} after {} passes over the training set",
        config.name,
        trainer.state().epoch,
        trainer.cursor().completed_training_epochs()
    );

    Ok(RunSummary {
        name:    config.name.clone(),
        log_dir: run.root().to_path_buf(),
        pretrain,
        main,
    })
}

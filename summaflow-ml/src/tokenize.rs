//! Batched, fixed-length tokenization of dialogue/summary pairs.

use std::path::Path;
use summaflow_core::{DataTransformationConfig, PipelineError, Result, Table};
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

pub const INPUT_IDS: &str = "input_ids";
pub const ATTENTION_MASK: &str = "attention_mask";
pub const LABELS: &str = "labels";

/// Pad tokens tried, in order, when the tokenizer carries no padding config.
const PAD_TOKEN_CANDIDATES: [&str; 2] = ["<pad>", "[PAD]"];

/// Model features for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedFeatures {
    pub input_ids: Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub labels: Vec<u32>,
}

/// Two configured copies of one tokenizer: inputs are truncated and padded to
/// `max_input_length`, targets to `max_target_length`.
#[derive(Clone)]
pub struct SummaryTokenizer {
    inputs: Tokenizer,
    targets: Tokenizer,
    batch_size: usize,
}

impl SummaryTokenizer {
    /// Load `name_or_path` from disk when it names an existing file,
    /// otherwise fetch it from the model hub.
    pub fn load(name_or_path: &str) -> Result<Tokenizer> {
        let path = Path::new(name_or_path);
        let tokenizer = if path.is_file() {
            Tokenizer::from_file(path)
        } else {
            Tokenizer::from_pretrained(name_or_path, None)
        }
        .map_err(|e| {
            tracing::error!(tokenizer = name_or_path, error = %e, "Failed to load tokenizer");
            PipelineError::tokenizer(format!("cannot load '{name_or_path}': {e}"))
        })?;
        tracing::info!(tokenizer = name_or_path, "Tokenizer loaded");
        Ok(tokenizer)
    }

    pub fn from_config(config: &DataTransformationConfig) -> Result<Self> {
        let base = Self::load(&config.tokenizer_name)?;
        Self::new(
            base,
            config.max_input_length,
            config.max_target_length,
            config.batch_size,
        )
    }

    pub fn new(
        base: Tokenizer,
        max_input_length: usize,
        max_target_length: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(PipelineError::invalid_input("batch_size must be positive"));
        }
        Ok(Self {
            inputs: fixed_length(base.clone(), max_input_length)?,
            targets: fixed_length(base, max_target_length)?,
            batch_size,
        })
    }

    /// Encode `texts` in chunks of `batch_size`, each text independently.
    fn encode_all(
        tokenizer: &Tokenizer,
        texts: &[&str],
        batch_size: usize,
    ) -> Result<Vec<Encoding>> {
        let mut encodings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size) {
            let batch = tokenizer
                .encode_batch(chunk.to_vec(), true)
                .map_err(|e| PipelineError::tokenizer(e.to_string()))?;
            encodings.extend(batch);
        }
        Ok(encodings)
    }

    /// Tokenize aligned dialogue/summary pairs.
    pub fn encode_pairs(
        &self,
        dialogues: &[&str],
        summaries: &[&str],
    ) -> Result<Vec<TokenizedFeatures>> {
        if dialogues.len() != summaries.len() {
            return Err(PipelineError::invalid_input(format!(
                "{} dialogues but {} summaries",
                dialogues.len(),
                summaries.len()
            )));
        }
        let inputs = Self::encode_all(&self.inputs, dialogues, self.batch_size)?;
        let targets = Self::encode_all(&self.targets, summaries, self.batch_size)?;
        Ok(inputs
            .into_iter()
            .zip(targets)
            .map(|(input, target)| TokenizedFeatures {
                input_ids: input.get_ids().to_vec(),
                attention_mask: input.get_attention_mask().to_vec(),
                labels: target.get_ids().to_vec(),
            })
            .collect())
    }

    /// Return `table` with `input_ids`, `attention_mask` and `labels` columns
    /// appended, each cell a JSON integer array.
    pub fn tokenize_table(
        &self,
        table: &Table,
        text_column: &str,
        summary_column: &str,
    ) -> Result<Table> {
        let dialogues = table.column_values(text_column)?;
        let summaries = table.column_values(summary_column)?;
        let features = self.encode_pairs(&dialogues, &summaries)?;

        let mut input_ids = Vec::with_capacity(features.len());
        let mut attention_mask = Vec::with_capacity(features.len());
        let mut labels = Vec::with_capacity(features.len());
        for f in &features {
            input_ids.push(serde_json::to_string(&f.input_ids)?);
            attention_mask.push(serde_json::to_string(&f.attention_mask)?);
            labels.push(serde_json::to_string(&f.labels)?);
        }

        let mut out = table.clone();
        out.push_column(INPUT_IDS, input_ids)?;
        out.push_column(ATTENTION_MASK, attention_mask)?;
        out.push_column(LABELS, labels)?;
        tracing::debug!(rows = out.row_count(), "Partition tokenized");
        Ok(out)
    }
}

/// Configure a tokenizer to truncate and pad every encoding to `length`.
fn fixed_length(mut tokenizer: Tokenizer, length: usize) -> Result<Tokenizer> {
    if length == 0 {
        return Err(PipelineError::invalid_input("max length must be positive"));
    }
    let padding = match tokenizer.get_padding() {
        Some(existing) => PaddingParams {
            strategy: PaddingStrategy::Fixed(length),
            ..existing.clone()
        },
        None => {
            let mut params = PaddingParams {
                strategy: PaddingStrategy::Fixed(length),
                ..Default::default()
            };
            if let Some((token, id)) = PAD_TOKEN_CANDIDATES
                .iter()
                .find_map(|t| tokenizer.token_to_id(t).map(|id| (*t, id)))
            {
                params.pad_token = token.to_string();
                params.pad_id = id;
            }
            params
        }
    };

    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: length,
            ..Default::default()
        }))
        .map_err(|e| PipelineError::tokenizer(e.to_string()))?
        .with_padding(Some(padding));
    Ok(tokenizer)
}

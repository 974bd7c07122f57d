//! Two-phase extraction pipeline.
//!
//! Pipeline flow:
//! Corpus → Schema inference → Synthesizer → RecordType → Extraction → Records

use crate::client::{CompletionService, Message, Usage};
use crate::gateway::{Completion, Gateway, GatewayRequest, Many, Model};
use crate::models::{
    DynaschemaError, ExtractionConfig, Record, RecordType, Result, SchemaProposal,
};
use crate::schema::{record_type_name, synthesize};
use std::time::Instant;
use tracing::{debug, info};

const EXTRACTOR_SYSTEM_PROMPT: &str = "You are a world class data structure extractor.";

/// Result of a completed extraction session.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Type synthesized from the inferred properties
    pub record_type: RecordType,
    /// Records extracted from the corpus, all instances of `record_type`
    pub records: Vec<Record>,
    /// Usage across the inference and extraction calls
    pub usage: Usage,
    /// Service calls across both phases
    pub service_calls: u32,
}

/// Infers a schema for a concept, then extracts records of that schema.
pub struct ExtractionPipeline<S> {
    gateway: Gateway<S>,
    config: ExtractionConfig,
}

impl<S: CompletionService> ExtractionPipeline<S> {
    pub fn new(gateway: Gateway<S>, config: ExtractionConfig) -> Self {
        Self { gateway, config }
    }

    fn build_inference_prompt(corpus: &str, concept: &str) -> String {
        format!(
            "provide all necessary properties for a {concept} data class which captures all given information \
             about the {concept}s described in the context below.\n\
             context: {corpus}"
        )
    }

    fn build_extraction_prompt(corpus: &str) -> String {
        format!("parse the context: `{corpus}`")
    }

    /// Infer the properties of `concept` from `corpus` and synthesize a record type.
    ///
    /// An empty proposal fails with `EmptySchema` and is not re-asked.
    pub async fn infer_schema(&self, corpus: &str, concept: &str) -> Result<Completion<RecordType>> {
        if concept.trim().is_empty() {
            return Err(DynaschemaError::InvalidInput(
                "concept name must not be empty".to_string(),
            ));
        }

        let request = GatewayRequest::new(
            vec![
                Message::system(EXTRACTOR_SYSTEM_PROMPT),
                Message::user(Self::build_inference_prompt(corpus, concept)),
            ],
            (&self.config.inference_model).into(),
        )
        .with_max_retries(self.config.inference_retries);

        let Completion {
            value: proposal,
            usage,
            attempts,
            model,
        } = self
            .gateway
            .request(&Model::<SchemaProposal>::new(), request)
            .await?;

        let descriptors = proposal.normalized()?;
        if descriptors.is_empty() {
            return Err(DynaschemaError::EmptySchema {
                concept: concept.to_string(),
            });
        }

        let record_type = synthesize(&record_type_name(concept), &descriptors)?;
        info!(
            concept = concept,
            record_type = record_type.name(),
            fields = record_type.fields().len(),
            attempts = attempts,
            "Inferred schema"
        );

        Ok(Completion {
            value: record_type,
            usage,
            attempts,
            model,
        })
    }

    /// Extract zero or more instances of `record_type` from `corpus`.
    pub async fn extract(
        &self,
        record_type: &RecordType,
        corpus: &str,
    ) -> Result<Completion<Vec<Record>>> {
        let request = GatewayRequest::new(
            vec![Message::user(Self::build_extraction_prompt(corpus))],
            (&self.config.extraction_model).into(),
        )
        .with_max_retries(self.config.extraction_retries);

        let completion = self.gateway.request(&Many::of(record_type), request).await?;
        debug!(
            record_type = record_type.name(),
            records = completion.value.len(),
            attempts = completion.attempts,
            "Extracted records"
        );
        Ok(completion)
    }

    /// Infer a schema from `corpus` and extract records from the same text.
    pub async fn infer_and_extract(&self, corpus: &str, concept: &str) -> Result<Extraction> {
        self.infer_and_extract_from(corpus, corpus, concept).await
    }

    /// Infer a schema from `schema_corpus` and extract from `extraction_corpus`.
    pub async fn infer_and_extract_from(
        &self,
        schema_corpus: &str,
        extraction_corpus: &str,
        concept: &str,
    ) -> Result<Extraction> {
        let start = Instant::now();

        let inferred = self.infer_schema(schema_corpus, concept).await?;
        let extracted = self.extract(&inferred.value, extraction_corpus).await?;

        let extraction = Extraction {
            record_type: inferred.value,
            records: extracted.value,
            usage: inferred.usage + extracted.usage,
            service_calls: inferred.attempts + extracted.attempts,
        };

        info!(
            concept = concept,
            records = extraction.records.len(),
            service_calls = extraction.service_calls,
            total_tokens = extraction.usage.total_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Extraction complete"
        );

        Ok(extraction)
    }
}

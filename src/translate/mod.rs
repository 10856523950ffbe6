//! Translation of listing descriptions.
//!
//! [`Translator`] sits in front of a [`TranslationBackend`] and adds:
//!
//! 1. input validation (empty text, malformed language code -> `Permanent`)
//! 2. a persistent, content-addressed [`TranslationCache`] lookup
//! 3. at most one outbound call per content hash at a time: concurrent
//!    requests for the same text wait on the first caller's result
//! 4. retries of `Transient` failures under the translation [`RetryPolicy`]
//! 5. a cache write only after a confirmed success
//!
//! [`Translator::translate_item`] applies the result to a [`TrendingItem`],
//! degrading to the original text instead of failing.

use crate::error::TranslationError;
use crate::models::{TranslationCacheEntry, TrendingItem};
use crate::retry::{RetryPolicy, retry_async};
use crate::utils::truncate_for_log;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

pub mod cache;
pub mod deepseek;

pub use cache::{TranslationCache, content_hash};

/// Remote capability: translate `text` into `target_lang`.
pub trait TranslationBackend {
    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslationError>;
}

static LANG_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{2,3}(-[A-Za-z0-9]{2,8})*$").expect("valid language regex"));

type InFlight = Arc<OnceCell<Result<String, TranslationError>>>;

pub struct Translator<B> {
    backend: B,
    cache: Arc<TranslationCache>,
    policy: RetryPolicy,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

impl<B: TranslationBackend> Translator<B> {
    pub fn new(backend: B, cache: Arc<TranslationCache>, policy: RetryPolicy) -> Self {
        Self {
            backend,
            cache,
            policy,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Translate `text`, consulting the cache first.
    #[instrument(level = "debug", skip_all, fields(target_lang = %target_lang))]
    pub async fn translate(&self, text: &str, target_lang: &str) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Err(TranslationError::permanent("empty input"));
        }
        if !LANG_CODE.is_match(target_lang.trim()) {
            return Err(TranslationError::permanent(format!(
                "unsupported target language `{target_lang}`"
            )));
        }

        let hash = content_hash(text, target_lang);
        if let Some(hit) = self.cache.get(&hash) {
            debug!(hash = %&hash[..12], "Translation cache hit");
            return Ok(hit);
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(in_flight.entry(hash.clone()).or_default())
        };

        let result = cell
            .get_or_init(|| async {
                // Another caller may have finished between our cache miss and now.
                if let Some(hit) = self.cache.get(&hash) {
                    return Ok(hit);
                }
                let res = self.call_with_retry(text, target_lang).await;
                if let Ok(translated) = &res {
                    self.cache.insert(TranslationCacheEntry {
                        content_hash: hash.clone(),
                        target_lang: target_lang.trim().to_string(),
                        translated_text: translated.clone(),
                        created_at: Utc::now(),
                    });
                }
                res
            })
            .await
            .clone();

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
            if in_flight.get(&hash).is_some_and(|c| Arc::ptr_eq(c, &cell)) {
                in_flight.remove(&hash);
            }
        }
        result
    }

    async fn call_with_retry(&self, text: &str, target_lang: &str) -> Result<String, TranslationError> {
        retry_async(
            &self.policy,
            "translate",
            || self.backend.translate(text, target_lang),
            TranslationError::is_transient,
        )
        .await
    }

    /// Fill `description_translated`, or flag the item as degraded.
    ///
    /// Blank descriptions are left alone: there is nothing to translate.
    pub async fn translate_item(&self, mut item: TrendingItem, target_lang: &str) -> TrendingItem {
        if item.description.trim().is_empty() {
            return item;
        }
        match self.translate(&item.description, target_lang).await {
            Ok(translated) => {
                item.description_translated = Some(translated);
                item.translation_degraded = false;
            }
            Err(e) => {
                warn!(
                    source = %item.source_id,
                    id = %item.external_id,
                    kind = ?e.kind,
                    error = %e,
                    text = %truncate_for_log(&item.description, 80),
                    "Translation unavailable; publishing original text"
                );
                item.description_translated = None;
                item.translation_degraded = true;
            }
        }
        item
    }
}

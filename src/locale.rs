use crate::host::{HostCapabilities, ProcessLocale, TranslationHost};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Errors raised while switching locales. They never leave the neutralizer.
#[derive(thiserror::Error, Debug)]
pub enum LocaleError {
    #[error("locale name contains a NUL byte: {0:?}")]
    InvalidName(String),

    #[error("host rejected switch to locale {0:?}")]
    SwitchRejected(String),

    #[error("no canonical translation found for text domain {0:?}")]
    NoCanonicalTranslation(String),

    #[error("process locale accepted none of {0:?}")]
    NoProcessLocale(Vec<String>),
}

/// Locale state captured before a capture forced the canonical locale.
///
/// Consumed by [`LocaleNeutralizer::restore`]; deliberately not `Clone`.
#[derive(Debug)]
pub struct LocaleSnapshot {
    /// Host locale before forcing.
    pub active_locale: String,
    /// Text domains that were loaded, in load order.
    pub text_domains: Vec<String>,
    /// Opaque `LC_ALL` value before forcing.
    pub process_locale: Option<String>,
    host_switched: bool,
}

/// Brackets a capture so everything it produces is in the canonical locale.
#[derive(Clone)]
pub struct LocaleNeutralizer {
    host: Arc<dyn TranslationHost>,
    process: Arc<dyn ProcessLocale>,
    capabilities: HostCapabilities,
    canonical: String,
    process_candidates: Vec<String>,
}

impl LocaleNeutralizer {
    /// Build a neutralizer; host capabilities are resolved here, once.
    pub fn new(
        host: Arc<dyn TranslationHost>,
        process: Arc<dyn ProcessLocale>,
        canonical: impl Into<String>,
        process_candidates: Vec<String>,
    ) -> Self {
        let capabilities = host.capabilities();
        Self {
            host,
            process,
            capabilities,
            canonical: canonical.into(),
            process_candidates,
        }
    }

    pub fn capabilities(&self) -> HostCapabilities {
        self.capabilities
    }

    /// Record the current locale state, then force the canonical locale.
    ///
    /// Loaded text domains are unloaded, the host locale is switched, and
    /// each domain is reloaded from its canonical-locale translation when
    /// one exists. `LC_ALL` is forced to the first accepted candidate.
    pub fn snapshot_and_force_canonical(&self) -> LocaleSnapshot {
        let caps = self.capabilities;

        let active_locale = if caps.locale_switching {
            self.host.current_locale()
        } else {
            String::new()
        };
        let text_domains = if caps.text_domains {
            self.host.loaded_text_domains()
        } else {
            Vec::new()
        };

        for domain in &text_domains {
            self.host.unload_text_domain(domain);
        }

        let host_switched = match self.force_host_locale() {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %err, "host locale left unchanged");
                false
            }
        };

        for domain in &text_domains {
            if let Err(err) = self.load_canonical_domain(domain) {
                debug!(error = %err, "text domain left untranslated");
            }
        }

        let process_locale = self.process.get();
        if process_locale.is_some() {
            if let Err(err) = self.force_process_locale() {
                debug!(error = %err, "process locale left unchanged");
            }
        }

        LocaleSnapshot {
            active_locale,
            text_domains,
            process_locale,
            host_switched,
        }
    }

    /// Undo [`LocaleNeutralizer::snapshot_and_force_canonical`].
    ///
    /// The canonical domains are only unloaded; the host reloads them in
    /// the restored locale the next time they are used.
    pub fn restore(&self, snapshot: LocaleSnapshot) {
        if snapshot.host_switched {
            let popped = self.capabilities.locale_stack && self.host.restore_previous_locale();
            if !popped && !self.host.switch_locale(&snapshot.active_locale) {
                debug!(locale = %snapshot.active_locale, "failed to switch host locale back");
            }
        }

        if self.capabilities.text_domains {
            for domain in &snapshot.text_domains {
                self.host.unload_text_domain(domain);
            }
        }

        if let Some(setting) = snapshot.process_locale.as_deref() {
            if !self.process.restore(setting) {
                debug!(setting, "failed to restore process locale");
            }
        }
    }

    fn force_host_locale(&self) -> Result<(), LocaleError> {
        if !self.capabilities.locale_switching {
            return Err(LocaleError::SwitchRejected(self.canonical.clone()));
        }
        if self.host.switch_locale(&self.canonical) {
            Ok(())
        } else {
            Err(LocaleError::SwitchRejected(self.canonical.clone()))
        }
    }

    fn force_process_locale(&self) -> Result<String, LocaleError> {
        self.process
            .set_first(&self.process_candidates)
            .ok_or_else(|| LocaleError::NoProcessLocale(self.process_candidates.clone()))
    }

    fn load_canonical_domain(&self, domain: &str) -> Result<PathBuf, LocaleError> {
        for path in self.canonical_translation_candidates(domain) {
            self.host.load_text_domain(domain, &path);
            if self.host.is_text_domain_loaded(domain) {
                return Ok(path);
            }
        }
        Err(LocaleError::NoCanonicalTranslation(domain.to_string()))
    }

    /// Plugin language directory, global language directory, then the
    /// domain's packaged directory.
    pub fn canonical_translation_candidates(&self, domain: &str) -> Vec<PathBuf> {
        let file_name = format!("{}-{}.mo", domain, self.canonical);
        let mut candidates = Vec::with_capacity(3);
        if let Some(lang_dir) = self.host.language_dir() {
            candidates.push(lang_dir.join("plugins").join(&file_name));
            candidates.push(lang_dir.join(&file_name));
        }
        if let Some(packaged) = self.host.packaged_language_dir(domain) {
            candidates.push(packaged.join(&file_name));
        }
        candidates
    }
}

//! Bookkeeping of what a wallet attached to the host page.
//!
//! Every global write is recorded with the value it displaced, so teardown undoes exactly
//! this wallet's changes and leaves providers installed by other code in place.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::host::{GlobalValue, HostPage, InjectedProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachMode {
    /// The slot was overwritten.
    Replace,
    /// The provider joined the slot's provider list.
    Append,
}

#[derive(Debug, Clone)]
pub struct GlobalAttachment {
    pub path: String,
    pub provider_id: String,
    pub mode: AttachMode,
    pub previous: Option<GlobalValue>,
    provider: InjectedProvider,
}

#[derive(Debug, Default)]
pub struct ProviderRegistration {
    attachments: Vec<GlobalAttachment>,
    pub announcer_started: bool,
    pub wallet_standard_registered: bool,
}

fn provider_id(provider: &InjectedProvider) -> String {
    match provider {
        InjectedProvider::Evm(p) => format!("evm:{}", p.wallet_id()),
        InjectedProvider::Solana(p) => format!("solana:{}", p.wallet_id()),
        InjectedProvider::External(name) => format!("external:{}", name),
    }
}

impl ProviderRegistration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attachments(&self) -> &[GlobalAttachment] {
        &self.attachments
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty() && !self.announcer_started && !self.wallet_standard_registered
    }

    /// Overwrites `path`, remembering what was there.
    pub fn attach_replace(&mut self, host: &HostPage, path: &str, provider: InjectedProvider) {
        let previous = host.set_global(path, GlobalValue::Single(provider.clone()));
        debug!(path, provider = %provider_id(&provider), displaced = previous.is_some(), "attached provider");
        self.attachments.push(GlobalAttachment {
            path: path.to_string(),
            provider_id: provider_id(&provider),
            mode: AttachMode::Replace,
            previous,
            provider,
        });
    }

    /// Adds `provider` next to whatever already lives at `path`.
    pub fn attach_append(&mut self, host: &HostPage, path: &str, provider: InjectedProvider) {
        let mut previous = None;
        host.update_global(path, |current| {
            previous = current.clone();
            let next = match current {
                None => GlobalValue::Single(provider.clone()),
                Some(existing) if existing.contains(&provider) => existing,
                Some(GlobalValue::Single(existing)) => GlobalValue::List(vec![existing, provider.clone()]),
                Some(GlobalValue::List(mut list)) => {
                    list.push(provider.clone());
                    GlobalValue::List(list)
                }
            };
            Some(next)
        });
        debug!(path, provider = %provider_id(&provider), "appended provider");
        self.attachments.push(GlobalAttachment {
            path: path.to_string(),
            provider_id: provider_id(&provider),
            mode: AttachMode::Append,
            previous,
            provider,
        });
    }

    /// Undoes every attachment, newest first.
    pub fn detach_all(&mut self, host: &HostPage) {
        while let Some(attachment) = self.attachments.pop() {
            match attachment.mode {
                AttachMode::Replace => Self::undo_replace(host, attachment),
                AttachMode::Append => Self::undo_append(host, attachment),
            }
        }
    }

    fn undo_replace(host: &HostPage, attachment: GlobalAttachment) {
        let GlobalAttachment { path, provider_id, previous, provider, .. } = attachment;
        host.update_global(&path, |current| match current {
            Some(GlobalValue::Single(current)) if current.same_as(&provider) => previous,
            other => {
                warn!(path = %path, provider = %provider_id, "global was overwritten since injection; leaving it");
                other
            }
        });
    }

    fn undo_append(host: &HostPage, attachment: GlobalAttachment) {
        let provider = attachment.provider;
        host.update_global(&attachment.path, |current| {
            let remaining: Vec<InjectedProvider> = current
                .map(|value| value.providers())
                .unwrap_or_default()
                .into_iter()
                .filter(|p| !p.same_as(&provider))
                .collect();
            match remaining.len() {
                0 => None,
                1 => remaining.into_iter().next().map(GlobalValue::Single),
                _ => Some(GlobalValue::List(remaining)),
            }
        });
    }
}

/// Providers currently visible at `path`, in slot order.
pub fn providers_at(host: &HostPage, path: &str) -> Vec<InjectedProvider> {
    host.global(path).map(|value| value.providers()).unwrap_or_default()
}

/// Installs a placeholder provider owned by "other code", for exercising coexistence.
pub fn install_external(host: &Arc<HostPage>, path: &str, name: &str) -> Option<GlobalValue> {
    host.set_global(path, GlobalValue::Single(InjectedProvider::External(name.to_string())))
}

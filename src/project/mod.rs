//! Configured projects: one Zoom account each, plus the Telegram channel
//! its recordings are archived in.

use anyhow::{bail, Context, Result};
use secrecy::Secret;
use std::path::{Path, PathBuf};

use crate::config::{resolve_required, resolve_value, ProjectConfig};
use crate::delivery::ChatRef;

#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub slug: String,
    pub account_id: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Shared channel holding previously posted recordings.
    pub channel: ChatRef,
    pub index_file: PathBuf,
}

impl Project {
    /// Builds a project from its config entry, resolving `env:` values.
    ///
    /// `index_dir` is used when the entry has no explicit `index_file`.
    pub fn resolve(config: &ProjectConfig, index_dir: &Path) -> Result<Self> {
        let name = config.name.trim().to_string();
        if name.is_empty() {
            bail!("Project name must not be empty");
        }
        let slug = slugify(&name);

        let account_id = resolve_required("account_id", &config.account_id)
            .with_context(|| format!("Project {}", name))?;
        let client_id = resolve_required("client_id", &config.client_id)
            .with_context(|| format!("Project {}", name))?;
        let client_secret = resolve_required("client_secret", &config.client_secret)
            .with_context(|| format!("Project {}", name))?;

        let chat_id = resolve_required("channel_id", &config.channel_id)
            .with_context(|| format!("Project {}", name))?
            .trim()
            .parse::<i64>()
            .with_context(|| format!("Project {}: channel_id must be a chat id", name))?;

        let thread_id = match &config.thread_id {
            Some(raw) => {
                let value = resolve_value(raw).with_context(|| format!("Project {}", name))?;
                let value = value.trim();
                if value.is_empty() {
                    None
                } else {
                    Some(value.parse::<i32>().with_context(|| {
                        format!("Project {}: thread_id must be a message thread id", name)
                    })?)
                }
            }
            None => None,
        };

        let index_file = config
            .index_file
            .clone()
            .unwrap_or_else(|| index_dir.join(format!("{}.jsonl", slug)));

        Ok(Self {
            name,
            slug,
            account_id,
            client_id,
            client_secret: Secret::new(client_secret),
            channel: ChatRef { chat_id, thread_id },
            index_file,
        })
    }
}

#[cfg(test)]
impl Project {
    pub(crate) fn fixture(name: &str, index_file: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            slug: slugify(name),
            account_id: "acc-1".to_string(),
            client_id: "client".to_string(),
            client_secret: Secret::new("secret".to_string()),
            channel: ChatRef {
                chat_id: -1001,
                thread_id: Some(7),
            },
            index_file,
        }
    }
}

/// All configured projects, in config order.
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    projects: Vec<Project>,
}

impl ProjectRegistry {
    pub fn new(projects: Vec<Project>) -> Result<Self> {
        for (i, project) in projects.iter().enumerate() {
            if projects[..i].iter().any(|p| p.slug == project.slug) {
                bail!("Duplicate project name: {}", project.name);
            }
        }
        Ok(Self { projects })
    }

    pub fn from_configs(configs: &[ProjectConfig], index_dir: &Path) -> Result<Self> {
        let projects = configs
            .iter()
            .map(|c| Project::resolve(c, index_dir))
            .collect::<Result<Vec<_>>>()?;
        Self::new(projects)
    }

    /// Finds a project by name or slug, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Project> {
        let wanted = slugify(name);
        self.projects.iter().find(|p| p.slug == wanted)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.projects.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coarse file category used by the tree filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Code,
    Config,
    Documentation,
    Asset,
    Resource,
    Other,
}

impl FileCategory {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" | "jsx" | "ts" | "tsx" | "html" | "htm" | "css" | "scss"
            | "less" | "wasm" | "vue" => FileCategory::Code,
            "json" | "xml" | "yaml" | "yml" | "toml" | "ini" | "map" => FileCategory::Config,
            "md" | "markdown" | "txt" | "rst" | "pdf" => FileCategory::Documentation,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "ico" | "webp" | "bmp" | "avif" => {
                FileCategory::Asset
            }
            "woff" | "woff2" | "ttf" | "otf" | "eot" | "mp3" | "mp4" | "wav" | "ogg" | "webm"
            | "bin" | "dat" => FileCategory::Resource,
            _ => FileCategory::Other,
        }
    }

    /// Category for a file name, by its last extension.
    pub fn from_file_name(name: &str) -> Self {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => FileCategory::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Code => "code",
            FileCategory::Config => "config",
            FileCategory::Documentation => "documentation",
            FileCategory::Asset => "asset",
            FileCategory::Resource => "resource",
            FileCategory::Other => "other",
        }
    }
}

impl std::str::FromStr for FileCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "code" => Ok(FileCategory::Code),
            "config" => Ok(FileCategory::Config),
            "documentation" | "docs" => Ok(FileCategory::Documentation),
            "asset" => Ok(FileCategory::Asset),
            "resource" => Ok(FileCategory::Resource),
            "other" => Ok(FileCategory::Other),
            _ => Err(format!("Unknown file category: {}", s)),
        }
    }
}

/// Parsed `manifest.json`.
///
/// The required fields are typed; every other key is kept verbatim in
/// `extra` so nothing the extension declares is lost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub manifest_version: u8,
    pub description: Option<String>,
    /// Union of `permissions`, `host_permissions` and `optional_permissions`.
    pub permissions: Vec<String>,
    pub extra: Map<String, Value>,
}

impl Manifest {
    pub fn is_v3(&self) -> bool {
        self.manifest_version == 3
    }

    /// Strings of a permission-bearing array, empty when missing or malformed.
    pub fn declared(&self, field: &str) -> Vec<String> {
        string_array(self.extra.get(field))
    }

    /// Host match patterns. V2 mixes them into `permissions`.
    pub fn host_permissions(&self) -> Vec<String> {
        if self.is_v3() {
            return self.declared("host_permissions");
        }
        self.declared("permissions")
            .into_iter()
            .filter(|p| is_host_pattern(p))
            .collect()
    }

    /// API permissions, without host patterns.
    pub fn api_permissions(&self) -> Vec<String> {
        self.declared("permissions")
            .into_iter()
            .filter(|p| !is_host_pattern(p))
            .collect()
    }

    pub fn key(&self) -> Option<&str> {
        self.extra.get("key").and_then(Value::as_str)
    }

    pub fn background(&self) -> Option<Background> {
        let background = self.extra.get("background")?.as_object()?;
        Some(Background {
            service_worker: background
                .get("service_worker")
                .and_then(Value::as_str)
                .map(str::to_string),
            scripts: string_array(background.get("scripts")),
            page: background.get("page").and_then(Value::as_str).map(str::to_string),
            persistent: background.get("persistent").and_then(Value::as_bool),
        })
    }

    /// Toolbar action: `action` in V3, `browser_action` or `page_action` in V2.
    pub fn action(&self) -> Option<Action> {
        let (kind, value) = [
            (ActionKind::Action, "action"),
            (ActionKind::BrowserAction, "browser_action"),
            (ActionKind::PageAction, "page_action"),
        ]
        .into_iter()
        .find_map(|(kind, key)| self.extra.get(key).and_then(Value::as_object).map(|v| (kind, v)))?;

        Some(Action {
            kind,
            default_popup: value.get("default_popup").and_then(Value::as_str).map(str::to_string),
            default_title: value.get("default_title").and_then(Value::as_str).map(str::to_string),
        })
    }

    pub fn content_scripts(&self) -> Vec<ContentScript> {
        let Some(scripts) = self.extra.get("content_scripts").and_then(Value::as_array) else {
            return Vec::new();
        };
        scripts
            .iter()
            .filter_map(Value::as_object)
            .map(|script| ContentScript {
                matches: string_array(script.get("matches")),
                js: string_array(script.get("js")),
                css: string_array(script.get("css")),
                run_at: script.get("run_at").and_then(Value::as_str).map(str::to_string),
            })
            .collect()
    }

    /// V2 lists bare resource paths; V3 lists objects with `resources` and `matches`.
    pub fn web_accessible_resources(&self) -> Vec<WebAccessibleResource> {
        let Some(items) = self.extra.get("web_accessible_resources").and_then(Value::as_array)
        else {
            return Vec::new();
        };

        let plain: Vec<String> = items.iter().filter_map(Value::as_str).map(str::to_string).collect();
        let mut resources: Vec<WebAccessibleResource> = items
            .iter()
            .filter_map(Value::as_object)
            .map(|item| WebAccessibleResource {
                resources: string_array(item.get("resources")),
                matches: string_array(item.get("matches")),
            })
            .collect();

        if !plain.is_empty() {
            resources.insert(
                0,
                WebAccessibleResource {
                    resources: plain,
                    matches: Vec::new(),
                },
            );
        }
        resources
    }

    /// Every file the manifest points at: scripts, pages, popups.
    pub fn referenced_files(&self) -> Vec<String> {
        let mut files = Vec::new();
        if let Some(background) = self.background() {
            files.extend(background.service_worker);
            files.extend(background.scripts);
            files.extend(background.page);
        }
        if let Some(popup) = self.action().and_then(|a| a.default_popup) {
            files.push(popup);
        }
        for script in self.content_scripts() {
            files.extend(script.js);
            files.extend(script.css);
        }
        files
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Background {
    pub service_worker: Option<String>,
    pub scripts: Vec<String>,
    pub page: Option<String>,
    pub persistent: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    Action,
    BrowserAction,
    PageAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub kind: ActionKind,
    pub default_popup: Option<String>,
    pub default_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentScript {
    pub matches: Vec<String>,
    pub js: Vec<String>,
    pub css: Vec<String>,
    pub run_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebAccessibleResource {
    pub resources: Vec<String>,
    pub matches: Vec<String>,
}

pub(crate) fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn is_host_pattern(permission: &str) -> bool {
    permission == "<all_urls>" || permission.contains("://")
}

use std::io;
use std::path::PathBuf;

/// Errors raised while building an engine. Any of these aborts startup.
#[derive(Debug)]
pub enum GpxtxError {
    ConfigRead {
        path: PathBuf,
        source: io::Error,
    },
    ConfigParse(serde_yaml::Error),
    NoGenerators,
    WaypointLoad {
        path: PathBuf,
        source: io::Error,
    },
    WaypointParse {
        path: PathBuf,
        source: ParseError,
    },
    TemplateCompile {
        generator: String,
        source: TemplateError,
    },
}

impl std::fmt::Display for GpxtxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigRead { path, source } => {
                write!(f, "Unable to read config file {}: {source}", path.display())
            }
            Self::ConfigParse(e) => write!(f, "Config parse error: {e}"),
            Self::NoGenerators => write!(f, "Config defines no generators"),
            Self::WaypointLoad { path, source } => {
                write!(f, "Error opening waypoint file {}: {source}", path.display())
            }
            Self::WaypointParse { path, source } => {
                write!(f, "Error parsing waypoints in {}: {source}", path.display())
            }
            Self::TemplateCompile { generator, source } => {
                write!(f, "Error compiling template for generator '{generator}': {source}")
            }
        }
    }
}

impl std::error::Error for GpxtxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigRead { source, .. } | Self::WaypointLoad { source, .. } => Some(source),
            Self::ConfigParse(e) => Some(e),
            Self::WaypointParse { source, .. } => Some(source),
            Self::TemplateCompile { source, .. } => Some(source),
            Self::NoGenerators => None,
        }
    }
}

impl From<serde_yaml::Error> for GpxtxError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::ConfigParse(e)
    }
}

/// Errors from decoding a GPX document.
#[derive(Debug)]
pub enum ParseError {
    XmlParse(quick_xml::Error),
    MissingRoot,
    UnexpectedRoot(String),
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::XmlParse(e) => write!(f, "XML parse error: {e}"),
            Self::MissingRoot => write!(f, "Document has no <gpx> root element"),
            Self::UnexpectedRoot(name) => {
                write!(f, "Expected root element <gpx> but found <{name}>")
            }
            Self::MissingAttribute { element, attribute } => {
                write!(f, "Missing attribute '{attribute}' on <{element}>")
            }
            Self::InvalidAttribute {
                element,
                attribute,
                value,
            } => write!(
                f,
                "Invalid value '{value}' for attribute '{attribute}' on <{element}>"
            ),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<quick_xml::Error> for ParseError {
    fn from(e: quick_xml::Error) -> Self {
        Self::XmlParse(e)
    }
}

/// Template failures. `Syntax` and `UnknownFunction` surface at compile
/// time, the rest while rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateError {
    Syntax { offset: usize, message: String },
    UnknownFunction(String),
    MissingKey(String),
    Function { name: String, message: String },
}

impl TemplateError {
    pub(crate) fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    pub(crate) fn function(name: &str, message: impl Into<String>) -> Self {
        Self::Function {
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// True for errors only detectable at render time.
    pub fn is_render_error(&self) -> bool {
        matches!(self, Self::MissingKey(_) | Self::Function { .. })
    }
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Syntax { offset, message } => {
                write!(f, "template syntax error at byte {offset}: {message}")
            }
            Self::UnknownFunction(name) => write!(f, "function \"{name}\" not defined"),
            Self::MissingKey(key) => write!(f, "map has no entry for key \"{key}\""),
            Self::Function { name, message } => write!(f, "error calling {name}: {message}"),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Per-send transport failures. None of these stop a generator.
#[derive(Debug)]
pub enum SendError {
    Dial {
        destination: String,
        source: io::Error,
    },
    Write {
        destination: String,
        source: io::Error,
    },
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dial { destination, source } => {
                write!(f, "unable to connect to {destination}: {source}")
            }
            Self::Write { destination, source } => {
                write!(f, "unable to write to {destination}: {source}")
            }
        }
    }
}

impl std::error::Error for SendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Dial { source, .. } | Self::Write { source, .. } => Some(source),
        }
    }
}

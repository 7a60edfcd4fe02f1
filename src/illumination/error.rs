use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum IlluError {
    Shape { expected: usize, found: usize },
    TooFewPanels { required: usize, found: usize },
    NoShadedPanel,
    AllBandsSingular,
    InvalidPanel(String),
    InvalidGeometry(String),
    InvalidBrdf(f64),
}

impl fmt::Display for IlluError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IlluError::Shape { expected, found } => {
                write!(f, "expected {} values, found {}", expected, found)
            }
            IlluError::TooFewPanels { required, found } => write!(
                f,
                "at least {} calibration panels are required, found {}",
                required, found
            ),
            IlluError::NoShadedPanel => write!(
                f,
                "illumination back-calculation needs at least one shaded panel"
            ),
            IlluError::AllBandsSingular => write!(
                f,
                "panel geometry is singular at every band, illumination cannot be solved"
            ),
            IlluError::InvalidPanel(msg) => write!(f, "invalid panel: {}", msg),
            IlluError::InvalidGeometry(msg) => write!(f, "invalid geometry: {}", msg),
            IlluError::InvalidBrdf(sigma) => {
                write!(f, "Oren-Nayar roughness must be finite and >= 0, got {}", sigma)
            }
        }
    }
}

impl std::error::Error for IlluError {}

use image::{imageops, DynamicImage, RgbaImage};

use crate::errors::{BgArbiterError, Result};
use crate::metrics;

/// Foreground fraction below which the network output counts as "almost no
/// subject found" for the fallback path.
pub const MIN_FOREGROUND_THRESHOLD: f64 = 0.2;

/// Which background-removal method produced an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Direct neural-network segmentation pass.
    Network,
    /// Pre-packaged external background-removal routine.
    ExternalLibrary,
    /// Untouched input, selected when neither candidate is trustworthy.
    Original,
}

impl Method {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::ExternalLibrary => "external-library",
            Self::Original => "original",
        }
    }
}

/// A background-removal result paired with the method that produced it.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub image: RgbaImage,
    pub method: Method,
}

impl Candidate {
    pub const fn network(image: RgbaImage) -> Self {
        Self {
            image,
            method: Method::Network,
        }
    }

    pub const fn external(image: RgbaImage) -> Self {
        Self {
            image,
            method: Method::ExternalLibrary,
        }
    }
}

/// The four similarity/quality metrics computed between the two candidates.
#[derive(Debug, Clone, Copy)]
pub struct ScoreSet {
    /// Structural similarity between grayscale conversions, `[-1, 1]`.
    pub ssim: f64,
    /// Non-zero-alpha fraction of the network candidate, `[0, 1]`.
    pub foreground_ratio: f64,
    /// Structural similarity between Canny edge maps, `[-1, 1]`.
    pub edge: f64,
    /// First-channel histogram correlation, `[-1, 1]`.
    pub histogram: f64,
}

impl ScoreSet {
    /// Measures all four metrics between the network and external candidates.
    ///
    /// The foreground ratio is asymmetric by design: it is always taken on
    /// the network output, gauging how much canvas the segmentation kept.
    pub fn measure(network: &RgbaImage, external: &RgbaImage) -> Result<Self> {
        let gray_network = imageops::grayscale(network);
        let gray_external = imageops::grayscale(external);

        Ok(Self {
            ssim: metrics::ssim(&gray_network, &gray_external)?,
            foreground_ratio: metrics::foreground_ratio(network)?,
            edge: metrics::edge_similarity(&gray_network, &gray_external)?,
            histogram: metrics::histogram_correlation(network, external)?,
        })
    }

    /// Composite quality scores for (network, external), each averaging
    /// four terms. The external score is the complement of each term, so
    /// agreement between the candidates favors the network pass and
    /// disagreement favors the external routine.
    pub fn composite(&self) -> (f64, f64) {
        let network = (self.ssim + self.foreground_ratio + self.edge + self.histogram) / 4.0;
        let external = ((1.0 - self.ssim)
            + (1.0 - self.foreground_ratio)
            + (1.0 - self.edge)
            + (1.0 - self.histogram))
            / 4.0;
        (network, external)
    }
}

/// The chosen output and the method that produced it.
#[derive(Debug, Clone)]
pub struct Decision {
    pub image: RgbaImage,
    pub method: Method,
    pub scores: ScoreSet,
}

/// Chooses between the two removal candidates, or falls back to the
/// untouched original.
///
/// When the saliency gate reports no clear subject (`needs_removal` true)
/// and the network found almost no foreground, neither candidate is
/// trustworthy and the original wins outright. Otherwise the candidate with
/// the higher composite score wins; ties go to the external routine.
pub fn decide(
    network: Candidate,
    external: Candidate,
    original: &DynamicImage,
    needs_removal: bool,
) -> Result<Decision> {
    ensure_comparable(&network.image, external.image.dimensions())?;
    ensure_comparable(&network.image, (original.width(), original.height()))?;

    let scores = ScoreSet::measure(&network.image, &external.image)?;

    if needs_removal && scores.foreground_ratio < MIN_FOREGROUND_THRESHOLD {
        log::debug!("foreground too small, falling back to the original image");
        return Ok(Decision {
            image: original.to_rgba8(),
            method: Method::Original,
            scores,
        });
    }

    Ok(pick(network, external, scores))
}

fn pick(network: Candidate, external: Candidate, scores: ScoreSet) -> Decision {
    let (network_score, external_score) = scores.composite();
    let winner = if network_score > external_score {
        network
    } else {
        external
    };
    Decision {
        image: winner.image,
        method: winner.method,
        scores,
    }
}

fn ensure_comparable(reference: &RgbaImage, actual: (u32, u32)) -> Result<()> {
    let expected = reference.dimensions();
    if expected == actual {
        Ok(())
    } else {
        Err(BgArbiterError::DimensionMismatch { expected, actual })
    }
}

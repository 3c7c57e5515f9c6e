//! Fibrosis grading.
//!
//! There is no model behind this: [`MockGrader`] draws a grade from a fixed
//! table and [`analysis_for`] fills a narrative template for that grade. The
//! [`Grader`] trait is the seam where a real classifier would plug in.

use rand::Rng;
use serde::Serialize;

use crate::models::Grade;

/// Fixed grade/confidence table the mock draws from.
const GRADE_TABLE: [(Grade, u8); 5] = [
    (Grade::F0, 85),
    (Grade::F1, 89),
    (Grade::F2, 92),
    (Grade::F3, 87),
    (Grade::F4, 91),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assessment {
    pub grade: Grade,
    /// Percentage, 0-100.
    pub confidence: u8,
}

pub trait Grader: Send + Sync {
    fn assess(&self, image: &[u8]) -> Assessment;
}

/// Uniform random pick over the grade table; ignores the image.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockGrader;

impl MockGrader {
    pub fn pick<R: Rng + ?Sized>(rng: &mut R) -> Assessment {
        let (grade, confidence) = GRADE_TABLE[rng.gen_range(0..GRADE_TABLE.len())];
        Assessment { grade, confidence }
    }
}

impl Grader for MockGrader {
    fn assess(&self, _image: &[u8]) -> Assessment {
        Self::pick(&mut rand::thread_rng())
    }
}

fn severity(grade: Grade) -> &'static str {
    match grade {
        Grade::F0 => "no significant",
        Grade::F1 => "mild",
        Grade::F2 => "moderate",
        Grade::F3 => "advanced",
        Grade::F4 => "severe",
    }
}

fn parenchyma(grade: Grade) -> &'static str {
    match grade {
        Grade::F0 => "Normal",
        Grade::F1 => "Mild",
        Grade::F2 => "Moderate",
        Grade::F3 => "Significant",
        Grade::F4 => "Severe",
    }
}

fn nodularity(grade: Grade) -> &'static str {
    match grade {
        Grade::F0 => "No",
        Grade::F4 => "Significant",
        _ => "Mild",
    }
}

fn periportal(grade: Grade) -> &'static str {
    match grade {
        Grade::F0 => "No",
        Grade::F1 => "Mild",
        Grade::F2 => "Moderate",
        Grade::F3 => "Advanced",
        Grade::F4 => "Severe",
    }
}

fn follow_up_months(grade: Grade) -> u8 {
    match grade {
        Grade::F0 => 12,
        Grade::F1 => 6,
        Grade::F2 => 4,
        Grade::F3 => 3,
        Grade::F4 => 2,
    }
}

/// Narrative analysis lines for a grade: intro, five findings, follow-up.
pub fn analysis_for(grade: Grade) -> Vec<String> {
    let stage = f64::from(grade.stage());
    let cirrhotic = grade == Grade::F4;
    let portal_vein_mm = 10.0 + stage * 0.5;
    let spleen_cm = 11.0 + stage * 0.8;

    vec![
        format!(
            "The ultrasound shows {} hepatic fibrosis consistent with {grade} grade (Metavir scale). Key findings include:",
            severity(grade)
        ),
        format!("{} heterogeneity of liver parenchyma", parenchyma(grade)),
        format!(
            "Portal vein diameter {} ({portal_vein_mm}mm)",
            if cirrhotic { "enlarged" } else { "within normal range" }
        ),
        format!("{} nodularity of liver surface", nodularity(grade)),
        format!("{} periportal fibrosis visible", periportal(grade)),
        format!(
            "Spleen size {} ({spleen_cm}cm)",
            if cirrhotic { "enlarged" } else { "normal" }
        ),
        format!(
            "Recommended follow-up: Repeat ultrasound in {} months to monitor progression.",
            follow_up_months(grade)
        ),
    ]
}

// src/scenario/catalog.rs

use super::{Detectability, Expectation, Preconditions, Scenario, Step};
use crate::compute::WorkRange;
use crate::lifecycle::SharpenParams;

const DEFAULT_SHARPEN: SharpenParams = SharpenParams::new(0, 0.5, 0.5);
const COMPLIANT_RANGE: WorkRange = WorkRange::new([512, 512], [16, 16]);
const OVERSIZED_RANGE: WorkRange = WorkRange::new([512, 512], [1024, 1024]);

const GREY_256: Step = Step::SupplyImage {
    width: 256,
    height: 256,
    fill: 128,
    has_alpha: true,
    shortfall: 0,
};

/// Every scenario the harness knows, baselines first.
pub static CATALOG: &[Scenario] = &[
    // --- Baselines ---
    Scenario {
        name: "baseline_lifecycle",
        summary: "initialize immediately followed by destroy",
        violates: Preconditions::empty(),
        expected: Expectation::Succeeds,
        steps: &[Step::Initialize, Step::Destroy],
    },
    Scenario {
        name: "baseline_sharpen",
        summary: "256x256 RGBA of 128s sharpened with mode 0, 0.5, 0.5",
        violates: Preconditions::empty(),
        expected: Expectation::Succeeds,
        steps: &[
            Step::Initialize,
            GREY_256,
            Step::Sharpen(DEFAULT_SHARPEN),
            Step::Destroy,
        ],
    },
    Scenario {
        name: "compliant_dispatch_identity",
        summary: "512x512 copy kernel with 16x16 work groups returns its input",
        violates: Preconditions::empty(),
        expected: Expectation::Succeeds,
        steps: &[Step::Dispatch(COMPLIANT_RANGE)],
    },
    // --- Misuse ---
    Scenario {
        name: "null_image_supply",
        summary: "supplyImage reads through a null image pointer",
        violates: Preconditions::NON_NULL_IMAGE,
        expected: Expectation::Detected(Detectability::SanitizerOnly),
        steps: &[
            Step::Initialize,
            Step::SupplyNullImage {
                width: 256,
                height: 256,
                has_alpha: true,
            },
            Step::Destroy,
        ],
    },
    Scenario {
        name: "out_of_range_sharpen",
        summary: "sharpen strength 4.0 and contrast adaption -2.0",
        violates: Preconditions::PARAMETER_RANGE,
        expected: Expectation::Discover,
        steps: &[
            Step::Initialize,
            GREY_256,
            Step::Sharpen(SharpenParams::new(0, 4.0, -2.0)),
            Step::Destroy,
        ],
    },
    Scenario {
        name: "double_destroy",
        summary: "destroy called twice on the same context",
        violates: Preconditions::HANDLE_LIVE,
        expected: Expectation::Detected(Detectability::SanitizerOnly),
        steps: &[Step::Initialize, Step::Destroy, Step::DestroyAgain],
    },
    Scenario {
        name: "oversized_work_group",
        summary: "1024x1024 local size over a 512x512 global range, then a compliant launch",
        violates: Preconditions::WORK_GROUP_LIMIT,
        expected: Expectation::Detected(Detectability::RuntimeError),
        steps: &[
            Step::Dispatch(COMPLIANT_RANGE),
            Step::DispatchOversized(OVERSIZED_RANGE),
            Step::Dispatch(COMPLIANT_RANGE),
        ],
    },
    Scenario {
        name: "sharpen_before_supply",
        summary: "sharpenImage on a context that has no image",
        violates: Preconditions::IMAGE_SUPPLIED,
        expected: Expectation::Detected(Detectability::HostAnalyzer),
        steps: &[Step::Initialize, Step::Sharpen(DEFAULT_SHARPEN), Step::Destroy],
    },
    Scenario {
        name: "short_image_buffer",
        summary: "image buffer 4 bytes shorter than rows*cols*4",
        violates: Preconditions::BUFFER_LENGTH,
        expected: Expectation::Detected(Detectability::HostAnalyzer),
        steps: &[
            Step::Initialize,
            Step::SupplyImage {
                width: 64,
                height: 64,
                fill: 128,
                has_alpha: true,
                shortfall: 4,
            },
            Step::Destroy,
        ],
    },
];

/// Looks a scenario up by name.
pub fn find(name: &str) -> Option<&'static Scenario> {
    CATALOG.iter().find(|s| s.name == name)
}

// src/lifecycle/tests.rs

use super::*;
use crate::native::SimulatedCas;
use crate::scenario::Preconditions;
use test_log::test;

// --- Pure transition model ---

#[test]
fn happy_path_walks_every_state() {
    let s = LifecycleState::Uninitialized;
    let s = s.transition(Operation::Initialize).unwrap();
    assert_eq!(s, LifecycleState::Initialized);
    let s = s.transition(Operation::SupplyImage).unwrap();
    assert_eq!(s, LifecycleState::ImageSupplied);
    let s = s.transition(Operation::SharpenImage).unwrap();
    assert_eq!(s, LifecycleState::Sharpened);
    let s = s.transition(Operation::Destroy).unwrap();
    assert_eq!(s, LifecycleState::Destroyed);
}

#[test]
fn image_can_be_resupplied_after_sharpening() {
    let s = LifecycleState::Sharpened.transition(Operation::SupplyImage);
    assert_eq!(s, Ok(LifecycleState::ImageSupplied));
}

#[test]
fn sharpen_requires_a_supplied_image() {
    let err = LifecycleState::Initialized
        .transition(Operation::SharpenImage)
        .unwrap_err();
    assert_eq!(err.violated(), Preconditions::IMAGE_SUPPLIED);
}

#[test]
fn nothing_is_legal_after_destroy() {
    for op in [
        Operation::Initialize,
        Operation::SupplyImage,
        Operation::SharpenImage,
        Operation::Destroy,
    ] {
        let err = LifecycleState::Destroyed.transition(op).unwrap_err();
        assert_eq!(err.violated(), Preconditions::HANDLE_LIVE, "{}", op);
    }
}

#[test]
fn invalid_state_is_absorbing() {
    for op in [
        Operation::Initialize,
        Operation::SupplyImage,
        Operation::SharpenImage,
        Operation::Destroy,
    ] {
        assert!(LifecycleState::Invalid.transition(op).is_err());
    }
}

#[test]
fn initialize_is_not_reentrant_within_a_session() {
    assert!(LifecycleState::Initialized
        .transition(Operation::Initialize)
        .is_err());
}

// --- Session over the simulated library ---

#[test]
fn initialize_then_destroy_succeeds() {
    let cas = SimulatedCas::new();
    let session = Session::initialize(&cas).unwrap();
    assert_eq!(session.state(), LifecycleState::Initialized);
    assert_eq!(cas.live_contexts(), 1);

    let destroyed = session.destroy().unwrap();
    assert_ne!(destroyed.addr(), 0);
    assert_eq!(cas.live_contexts(), 0);
}

#[test]
fn allocation_failure_is_a_typed_error() {
    let cas = SimulatedCas::failing_allocation();
    let err = Session::initialize(&cas).unwrap_err();
    assert_eq!(err, LifecycleError::AllocationFailed);
    assert!(err.is_native());
}

#[test]
fn sharpen_256_square_returns_output() {
    let cas = SimulatedCas::new();
    let mut session = Session::initialize(&cas).unwrap();
    session
        .supply_image(ImageBuffer::filled(256, 256, 128).unwrap(), true)
        .unwrap();
    assert_eq!(session.state(), LifecycleState::ImageSupplied);

    let out = session
        .sharpen_image(SharpenParams::new(0, 0.5, 0.5))
        .unwrap();
    assert_eq!(session.state(), LifecycleState::Sharpened);

    // The simulated library's output mirrors the supplied image.
    assert_eq!(unsafe { *out.as_ptr() }, 128);
    session.destroy().unwrap();
}

#[test]
fn sharpen_before_supply_invalidates_session() {
    let cas = SimulatedCas::new();
    let mut session = Session::initialize(&cas).unwrap();
    let err = session
        .sharpen_image(SharpenParams::new(0, 0.5, 0.5))
        .unwrap_err();
    assert!(!err.is_native());
    assert_eq!(session.state(), LifecycleState::Invalid);

    // Absorbing: even a well-formed supply is now refused.
    assert!(session
        .supply_image(ImageBuffer::filled(4, 4, 0).unwrap(), false)
        .is_err());
}

#[test]
fn short_buffer_is_refused_before_the_library_sees_it() {
    let cas = SimulatedCas::new();
    let mut session = Session::initialize(&cas).unwrap();
    let short = ImageBuffer::filled(8, 8, 0).unwrap().truncated(4);
    let err = session.supply_image(short, true).unwrap_err();
    assert_eq!(
        err,
        LifecycleError::BufferTooSmall {
            required: 256,
            actual: 252
        }
    );
    assert_eq!(session.state(), LifecycleState::Invalid);
}

#[test]
fn oversized_dimensions_do_not_overflow() {
    assert_eq!(ImageBuffer::len_for(64, 64), Some(64 * 64 * 4));
    assert_eq!(ImageBuffer::len_for(u32::MAX, u32::MAX), None);
    assert!(ImageBuffer::filled(u32::MAX, u32::MAX, 0).is_none());
}

#[test]
fn out_of_range_params_pass_through_by_default() {
    let cas = SimulatedCas::new();
    let mut session = Session::initialize(&cas).unwrap();
    session
        .supply_image(ImageBuffer::filled(2, 2, 7).unwrap(), true)
        .unwrap();
    assert!(session
        .sharpen_image(SharpenParams::new(0, 4.0, -2.0))
        .is_ok());
}

#[test]
fn out_of_range_params_refused_when_validation_enabled() {
    let cas = SimulatedCas::new();
    let mut session = Session::initialize(&cas)
        .unwrap()
        .with_param_validation(true);
    session
        .supply_image(ImageBuffer::filled(2, 2, 7).unwrap(), true)
        .unwrap();
    let err = session
        .sharpen_image(SharpenParams::new(0, 4.0, 0.5))
        .unwrap_err();
    assert_eq!(err.violated(), Preconditions::PARAMETER_RANGE);
}

#[test]
fn dropping_a_live_session_releases_the_context() {
    let cas = SimulatedCas::new();
    {
        let mut session = Session::initialize(&cas).unwrap();
        session
            .supply_image(ImageBuffer::filled(2, 2, 1).unwrap(), true)
            .unwrap();
        assert_eq!(cas.live_contexts(), 1);
    }
    assert_eq!(cas.live_contexts(), 0);
}

#[test]
fn params_validate_inclusive_bounds() {
    assert!(SharpenParams::new(0, 0.0, 1.0).validate().is_ok());
    assert!(SharpenParams::new(0, 1.0001, 0.5).validate().is_err());
    assert!(SharpenParams::new(0, 0.5, f32::NAN).validate().is_err());
}

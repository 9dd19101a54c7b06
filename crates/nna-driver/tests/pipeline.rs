//! Orchestrator scenarios against a software register window
//!
//! The interrupt status register is scripted; every assertion is on the
//! recorded write log and read counts.

use nna_chip::ccu;
use nna_chip::regs::{self, cdma, glb, intr, pdp, sdp, sdp_rdma};
use nna_driver::prelude::*;
use nna_driver::{conv, Completion, RegisterProgram};
use std::time::Duration;

type SoftSession = Session<SoftwareWindow, SoftwareWindow>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Session with the convolution buffer already flushed and logs cleared.
fn session() -> SoftSession {
    init_tracing();
    let mut s = Session::with_windows(
        SoftwareWindow::nna(),
        SoftwareWindow::ccu(),
        &SessionConfig::default(),
    )
    .unwrap();
    s.nna_mut().set(cdma::S_CBUF_FLUSH_STATUS, 1);
    s.nna_mut().clear_log();
    s.power_mut().ccu_mut().clear_log();
    s
}

fn cifar_conv1() -> ConvOperation {
    ConvOperation::new(
        DataCube::feature(0x4004_0000, CubeDims::new(32, 32, 3)),
        Kernel::square(5, 32),
        0x4000_0000,
    )
    .with_padding(Padding::symmetric(2))
}

fn conv_only() -> PipelineRun {
    let dims = CubeDims::new(32, 32, 32);
    PipelineRun::ConvOnly {
        conv: cifar_conv1(),
        sdp: ScaleBiasOperation::new(
            DataCube::flying(dims),
            DataCube::feature(0x4008_0000, dims),
        )
        .with_x1(Lane::bias(0x4002_0000, 0)),
    }
}

fn conv_pool() -> PipelineRun {
    let dims = CubeDims::new(32, 32, 32);
    PipelineRun::ConvPool {
        conv: cifar_conv1(),
        sdp: ScaleBiasOperation::new(DataCube::flying(dims), DataCube::flying(dims))
            .with_x1(Lane::bias(0x4002_0000, 0).with_activation(Activation::Relu)),
        pdp: PoolOperation::new(
            PoolMode::Max,
            3,
            2,
            DataCube::flying(dims),
            DataCube::feature(0x4006_0000, CubeDims::new(16, 16, 32)),
        ),
    }
}

fn opts(timeout: Duration) -> RunOptions {
    RunOptions::default().with_timeout(timeout)
}

fn ccu_gate_writes(s: &mut SoftSession) -> Vec<u32> {
    s.power_mut().ccu_mut().writes_to(ccu::NNA_GATE)
}

#[test]
fn conv_only_done_after_n_polls() {
    let mut s = session();
    let mask = intr::CONV_ONLY_MASK;
    s.nna_mut()
        .script_reads(glb::S_INTR_STATUS, [0, 0, 0x1, 0x0001_0001, mask]);

    let report = s
        .run_operation(&conv_only(), &opts(Duration::from_millis(50)))
        .unwrap();

    assert_eq!(report.polls, 5);
    assert_eq!(report.shape, "conv_only");
    assert_eq!(s.nna().read_count(glb::S_INTR_STATUS), 5);
    assert_eq!(
        s.nna().writes_to(glb::S_INTR_STATUS),
        vec![glb::INTR_CLEAR_ALL]
    );
    assert_eq!(ccu_gate_writes(&mut s), vec![ccu::GATE_OFF, ccu::GATE_ON]);
    assert_eq!(s.state(), PipelineState::Idle);
}

#[test]
fn conv_pool_done_visits_every_state() {
    let mut s = session();
    s.nna_mut()
        .script_reads(glb::S_INTR_STATUS, [0x0015_0001, intr::CONV_POOL_MASK]);

    let report = s
        .run_operation(&conv_pool(), &RunOptions::default())
        .unwrap();

    assert_eq!(report.polls, 2);
    assert_eq!(
        report.states,
        vec![
            PipelineState::Idle,
            PipelineState::ProducerSet,
            PipelineState::Programmed,
            PipelineState::Enabled,
            PipelineState::WaitingCompletion,
            PipelineState::Done,
            PipelineState::Idle,
        ]
    );
}

#[test]
fn timeout_after_budget_and_still_resets() {
    let mut s = session();
    s.nna_mut().set(glb::S_INTR_STATUS, 0x0015_0000);

    let err = s
        .run_operation(&conv_only(), &opts(Duration::from_millis(2)))
        .unwrap_err();

    match err {
        NnaError::Timeout {
            status,
            expected,
            polls,
            ..
        } => {
            assert_eq!(status, 0x0015_0000);
            assert_eq!(expected, intr::CONV_ONLY_MASK);
            // 2 ms / 20 µs
            assert_eq!(polls, 100);
        }
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(s.nna().read_count(glb::S_INTR_STATUS), 100);
    assert!(s.nna().writes_to(glb::S_INTR_STATUS).is_empty());
    assert_eq!(ccu_gate_writes(&mut s), vec![ccu::GATE_OFF, ccu::GATE_ON]);
    assert_eq!(s.state(), PipelineState::Idle);
}

#[test]
fn cancel_stops_wait_and_resets() {
    let mut s = session();
    let token = CancelToken::new();
    token.cancel();

    let err = s
        .run_operation(
            &conv_pool(),
            &opts(Duration::from_secs(10)).with_cancel(token),
        )
        .unwrap_err();

    assert!(matches!(err, NnaError::Cancelled { polls: 1 }), "{err}");
    assert_eq!(ccu_gate_writes(&mut s), vec![ccu::GATE_OFF, ccu::GATE_ON]);
    assert_eq!(s.state(), PipelineState::Idle);
}

#[test]
fn invalid_geometry_writes_nothing() {
    let mut s = session();
    let mut run = conv_pool();
    if let PipelineRun::ConvPool { pdp, .. } = &mut run {
        // 32 -> 8 cannot come out of a 3x3 stride 2 window
        pdp.destination = DataCube::feature(0x4006_0000, CubeDims::new(8, 8, 32));
    }

    let err = s.run_operation(&run, &RunOptions::default()).unwrap_err();

    assert!(err.is_contract_violation(), "{err}");
    assert!(s.nna().writes().is_empty());
    assert!(s.power_mut().ccu_mut().writes().is_empty());
    assert_eq!(s.state(), PipelineState::Idle);
}

#[test]
fn pixel_input_rejected_before_any_write() {
    let mut s = session();
    let mut run = conv_only();
    if let PipelineRun::ConvOnly { conv, .. } = &mut run {
        conv.input = DataCube::pixel(0x4004_0000, CubeDims::new(32, 32, 3));
    }

    let err = s.run_operation(&run, &RunOptions::default()).unwrap_err();

    assert!(matches!(err, NnaError::UnsupportedFormat { .. }), "{err}");
    assert!(s.nna().writes().is_empty());
}

#[test]
fn producers_first_then_programs_then_enables() {
    let mut s = session();
    s.nna_mut().set(glb::S_INTR_STATUS, intr::CONV_POOL_MASK);
    let compiled = conv_pool().compile().unwrap();

    s.run_operation(&conv_pool(), &RunOptions::default())
        .unwrap();

    let writes = s.nna().writes().to_vec();
    let pointer_count = conv::PRODUCER_POINTERS.len()
        + nna_driver::sdp::PRODUCER_POINTERS.len()
        + nna_driver::pdp::PRODUCER_POINTERS.len();
    let (pointers, rest) = writes.split_at(pointer_count);
    assert!(pointers.iter().all(|&(_, v)| v == regs::POINTER_GROUP_0));

    let program_len: usize = compiled.programs().map(RegisterProgram::len).sum();
    let (programmed, tail) = rest.split_at(program_len);
    let expected: Vec<(usize, u32)> = compiled
        .programs()
        .flat_map(|p| p.writes().iter().map(|w| (w.offset, w.value)))
        .collect();
    assert_eq!(programmed, expected.as_slice());

    let mut enables = vec![(cdma::D_PERF_ENABLE, 0)];
    enables.extend(conv::OP_ENABLES.iter().map(|&r| (r, regs::OP_ENABLE)));
    // bias lane reads memory, pool input streams from the scale-bias engine
    enables.push((sdp_rdma::D_OP_ENABLE, regs::OP_ENABLE));
    enables.push((sdp::D_OP_ENABLE, regs::OP_ENABLE));
    enables.push((pdp::D_OP_ENABLE, regs::OP_ENABLE));
    enables.push((glb::S_INTR_STATUS, glb::INTR_CLEAR_ALL));
    assert_eq!(tail, enables.as_slice());
}

#[test]
fn perf_stats_enable_counters() {
    let mut s = session();
    s.nna_mut().set(glb::S_INTR_STATUS, intr::CONV_POOL_MASK);

    s.run_operation(&conv_pool(), &RunOptions::default().with_perf_stats(true))
        .unwrap();

    assert_eq!(s.nna().writes_to(cdma::D_PERF_ENABLE), vec![1]);
    assert_eq!(
        s.nna().writes_to(sdp::D_PERF_ENABLE),
        vec![sdp::PERF_ENABLE_ALL]
    );
    assert_eq!(s.nna().writes_to(pdp::D_PERF_ENABLE), vec![1]);
}

#[test]
fn flush_never_observed_times_out() {
    let mut s = session();
    s.nna_mut().set(cdma::S_CBUF_FLUSH_STATUS, 0);

    let err = s
        .run_operation(&conv_only(), &opts(Duration::from_micros(200)))
        .unwrap_err();

    assert!(matches!(err, NnaError::FlushTimeout { polls: 10 }), "{err}");
    assert_eq!(s.nna().read_count(cdma::S_CBUF_FLUSH_STATUS), 10);
    assert_eq!(s.nna().read_count(glb::S_INTR_STATUS), 0);
    for reg in conv::OP_ENABLES {
        assert!(s.nna().writes_to(reg).is_empty());
    }
    assert_eq!(ccu_gate_writes(&mut s), vec![ccu::GATE_OFF, ccu::GATE_ON]);
    assert_eq!(s.state(), PipelineState::Idle);
}

#[test]
fn cancel_while_flush_pending() {
    let mut s = session();
    s.nna_mut().set(cdma::S_CBUF_FLUSH_STATUS, 0);
    let token = CancelToken::new();
    token.cancel();

    let err = s
        .run_operation(
            &conv_only(),
            &opts(Duration::from_secs(10)).with_cancel(token),
        )
        .unwrap_err();

    assert!(matches!(err, NnaError::Cancelled { polls: 1 }), "{err}");
    assert_eq!(s.nna().read_count(cdma::S_CBUF_FLUSH_STATUS), 1);
    assert_eq!(s.nna().read_count(glb::S_INTR_STATUS), 0);
    assert!(s.nna().writes_to(cdma::D_PERF_ENABLE).is_empty());
    for reg in conv::OP_ENABLES {
        assert!(s.nna().writes_to(reg).is_empty());
    }
    assert_eq!(ccu_gate_writes(&mut s), vec![ccu::GATE_OFF, ccu::GATE_ON]);
    assert_eq!(s.state(), PipelineState::Idle);
}

#[test]
fn late_flush_then_completion() {
    let mut s = session();
    s.nna_mut().script_reads(cdma::S_CBUF_FLUSH_STATUS, [0, 0, 1]);
    s.nna_mut().set(glb::S_INTR_STATUS, intr::CONV_ONLY_MASK);

    let report = s
        .run_operation(&conv_only(), &opts(Duration::from_millis(50)))
        .unwrap();

    assert_eq!(report.polls, 1);
    assert_eq!(s.nna().read_count(cdma::S_CBUF_FLUSH_STATUS), 3);
    for reg in conv::OP_ENABLES {
        assert_eq!(s.nna().writes_to(reg), vec![regs::OP_ENABLE]);
    }
    assert_eq!(ccu_gate_writes(&mut s), vec![ccu::GATE_OFF, ccu::GATE_ON]);
    assert_eq!(s.state(), PipelineState::Idle);
}

#[test]
fn back_to_back_runs() {
    let mut s = session();
    s.nna_mut().set(glb::S_INTR_STATUS, intr::CONV_POOL_MASK);
    let PipelineRun::ConvPool { conv, sdp, pdp } = conv_pool() else {
        unreachable!()
    };
    for _ in 0..3 {
        s.run_conv_pool(conv, sdp, pdp, &RunOptions::default())
            .unwrap();
    }
    assert_eq!(ccu_gate_writes(&mut s).len(), 6);
    assert_eq!(s.nna().writes_to(glb::S_INTR_STATUS).len(), 3);
}

#[test]
fn standalone_wait_reports_completion() {
    let mut w = SoftwareWindow::nna();
    w.script_reads(glb::S_INTR_STATUS, [0, intr::CONV_ONLY_MASK]);
    let c = nna_driver::wait_for_completion(
        &mut w,
        intr::CONV_ONLY_MASK,
        intr::CONV_ONLY_MASK,
        &RunOptions::default(),
    );
    assert!(matches!(c, Completion::Done { polls: 2, .. }));
}

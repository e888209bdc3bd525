use bencher::{TestCase, TestFile};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ember_http::codec::RequestDecoder;
use std::hint::black_box;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

static SMALL_HEADER: TestFile = TestFile::new("get_small.txt", include_str!("../resources/request/get_small.txt"));
static LARGE_HEADER: TestFile = TestFile::new("get_large.txt", include_str!("../resources/request/get_large.txt"));
static FORM_BODY: TestFile = TestFile::new("post_form.txt", include_str!("../resources/request/post_form.txt"));

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::whole("small_header", SMALL_HEADER),
        TestCase::whole("large_header", LARGE_HEADER),
        TestCase::fragmented("large_header_by_64", LARGE_HEADER, 64),
        TestCase::whole("form_body", FORM_BODY),
        TestCase::fragmented("form_body_by_7", FORM_BODY, 7),
    ]
}

/// Decodes every fragment as it arrives and counts the events up to completion.
fn decode_all(fragments: &[&'static [u8]]) -> usize {
    let mut decoder = RequestDecoder::new();
    let mut buffer = BytesMut::new();
    let mut events = 0;

    for fragment in fragments {
        buffer.extend_from_slice(fragment);
        while let Some(event) = decoder.decode(&mut buffer).expect("fixture should be a valid request") {
            events += 1;
            if event.is_complete() {
                return events;
            }
            black_box(event);
        }
    }
    panic!("fixture {fragments:?} did not complete");
}

fn benchmark_request_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("request_decoder");

    for case in create_test_cases() {
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            b.iter_batched_ref(|| case.fragments(), |fragments| black_box(decode_all(fragments)), BatchSize::SmallInput);
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_request_decoder);
criterion_main!(decoder);

use criterion::{Criterion, criterion_group, criterion_main};
use flate2::Compression;
use flate2::write::GzEncoder;
use fqstream::{FastqParser, ParserOptions, SeqRecord};
use std::io::{Cursor, Write};

fn sample(records: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..records {
        writeln!(data, "@r{i}\nACGTACGTACGTACGT\n+\n################").unwrap();
    }
    data
}

fn bench_parse(c: &mut Criterion) {
    let data = sample(2000);
    c.bench_function("parse_2000_owned", |b| {
        b.iter(|| {
            let fq = FastqParser::from_reader(Cursor::new(data.clone()), ParserOptions::default())
                .unwrap();
            let mut n = 0usize;
            for rec in fq {
                n += rec.unwrap().len();
            }
            n
        })
    });

    c.bench_function("parse_2000_ref", |b| {
        b.iter(|| {
            let mut fq =
                FastqParser::from_reader(Cursor::new(data.clone()), ParserOptions::default())
                    .unwrap();
            let mut n = 0usize;
            while let Ok(rec) = fq.next_ref_as_record() {
                n += rec.len();
            }
            n
        })
    });

    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(&sample(20_000)).unwrap();
    let packed = enc.finish().unwrap();
    c.bench_function("parse_20000_gzip_batches", |b| {
        b.iter(|| {
            let mut fq =
                FastqParser::from_reader(Cursor::new(packed.clone()), ParserOptions::default())
                    .unwrap();
            fq.batches(100).map(|batch| batch.unwrap().num_records()).sum::<usize>()
        })
    });
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);

//! A three-peer swarm over loopback TCP: one seed and two leechers, all
//! directly connected, sharing a multi-piece file. Exercises the choking
//! scheduler across more than one connection per peer and the
//! all-remote-views-complete termination check with more than one
//! remote.

mod common;

use std::time::Duration;

#[tokio::test]
async fn two_leechers_both_finish_from_one_seed() {
    let file_name = format!("itest_three_peer_{}.dat", std::process::id());
    let content: Vec<u8> = (0..251u8).cycle().take(64).collect();
    common::seed_file(&file_name, &content);

    let port = common::base_port(10);
    let seed_id = 9201;
    let leech1_id = 9202;
    let leech2_id = 9203;

    // leech2 is listed after both the seed and leech1, so it dials both;
    // leech1 dials only the seed.
    let config = common::build_config(
        &file_name,
        content.len() as u64,
        16,
        1,
        vec![
            common::peer(seed_id, port, true),
            common::peer(leech1_id, port + 1, false),
            common::peer(leech2_id, port + 2, false),
        ],
    );

    let seed = tokio::spawn(p2p_file_swarm::run(seed_id, config.clone()));
    let leech1 = tokio::spawn(p2p_file_swarm::run(leech1_id, config.clone()));
    let leech2 = tokio::spawn(p2p_file_swarm::run(leech2_id, config));

    let result = tokio::time::timeout(Duration::from_secs(20), async {
        let (seed_result, leech1_result, leech2_result) = tokio::join!(seed, leech1, leech2);
        seed_result.unwrap().unwrap();
        leech1_result.unwrap().unwrap();
        leech2_result.unwrap().unwrap();
    })
    .await;

    let downloaded1 = std::fs::read(common::downloaded_path(leech1_id, &file_name));
    let downloaded2 = std::fs::read(common::downloaded_path(leech2_id, &file_name));

    common::cleanup(&file_name, &[seed_id, leech1_id, leech2_id]);

    result.expect("swarm did not terminate in time");
    assert_eq!(downloaded1.unwrap(), content);
    assert_eq!(downloaded2.unwrap(), content);
}

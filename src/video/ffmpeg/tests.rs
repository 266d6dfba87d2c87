use super::*;

const PROBE_MP4: &str = r#"{
    "streams": [
        {
            "index": 0,
            "codec_type": "audio",
            "sample_rate": "44100"
        },
        {
            "index": 1,
            "codec_type": "video",
            "width": 1280,
            "height": 720,
            "r_frame_rate": "30000/1001",
            "avg_frame_rate": "30000/1001",
            "nb_frames": "1798",
            "duration": "59.993267"
        }
    ],
    "format": { "duration": "60.000000" }
}"#;

#[test]
fn probe_output_reads_first_video_stream() {
    let info = parse_probe_output(PROBE_MP4.as_bytes(), Path::new("clip.mp4"))
        .expect("should parse probe output");

    assert_eq!(info.width, 1280);
    assert_eq!(info.height, 720);
    assert_eq!(info.total_frames, 1798);
    assert!((info.fps - 29.970_029).abs() < 1e-5);
}

#[test]
fn probe_output_estimates_frame_count_from_duration() {
    let json = r#"{
        "streams": [
            { "codec_type": "video", "width": 640, "height": 480,
              "avg_frame_rate": "0/0", "r_frame_rate": "25/1" }
        ],
        "format": { "duration": "10.04" }
    }"#;

    let info = parse_probe_output(json.as_bytes(), Path::new("clip.mkv"))
        .expect("should parse probe output");

    assert!((info.fps - 25.0).abs() < f64::EPSILON);
    assert_eq!(info.total_frames, 251);
}

#[test]
fn probe_output_without_video_stream_fails() {
    let json = r#"{ "streams": [ { "codec_type": "audio" } ], "format": {} }"#;

    let result = parse_probe_output(json.as_bytes(), Path::new("song.m4a"));
    assert!(matches!(result, Err(DecodeError::NoVideoStream(_))));
}

#[test]
fn probe_output_without_frame_rate_fails() {
    let json = r#"{ "streams": [ { "codec_type": "video", "nb_frames": "10" } ] }"#;

    let result = parse_probe_output(json.as_bytes(), Path::new("odd.mp4"));
    assert!(matches!(result, Err(DecodeError::Probe { .. })));
}

#[test]
fn garbage_probe_output_fails() {
    let result = parse_probe_output(b"not json", Path::new("clip.mp4"));
    assert!(matches!(result, Err(DecodeError::Probe { .. })));
}

#[test]
fn frame_rate_parsing() {
    assert_eq!(parse_frame_rate("25/1"), Some(25.0));
    assert_eq!(parse_frame_rate("24"), Some(24.0));
    assert_eq!(parse_frame_rate("0/0"), None);
    assert_eq!(parse_frame_rate("30/0"), None);
    assert_eq!(parse_frame_rate("abc"), None);
    assert_eq!(parse_frame_rate("-5/1"), None);
}

#[test]
fn extraction_args_select_strided_frames_as_rgb() {
    let args = frame_extraction_args(Path::new("/videos/cat.mp4"), 60);
    let args: Vec<String> = args
        .iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();

    let input_pos = args.iter().position(|a| a == "-i").expect("has input flag");
    assert_eq!(args[input_pos + 1], "/videos/cat.mp4");
    assert!(args.contains(&"-noautorotate".to_string()));
    assert!(args.contains(&"select=not(mod(n\\,60))".to_string()));
    assert!(args.contains(&"rgb24".to_string()));
    let sync_pos = args
        .iter()
        .position(|a| a == "-fps_mode")
        .expect("has frame sync flag");
    assert_eq!(args[sync_pos + 1], "passthrough");
    assert!(!args.contains(&"-vsync".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
}

#[test]
fn extraction_args_clamp_zero_stride() {
    let args = frame_extraction_args(Path::new("clip.mp4"), 0);
    assert!(args.contains(&OsString::from("select=not(mod(n\\,1))")));
}

#[test]
fn read_full_handles_short_reads() {
    let data: Vec<u8> = (0..10).collect();
    let mut reader = io::Cursor::new(data);

    let mut buffer = [0_u8; 4];
    assert_eq!(read_full(&mut reader, &mut buffer).expect("should read"), 4);
    assert_eq!(buffer, [0, 1, 2, 3]);
    assert_eq!(read_full(&mut reader, &mut buffer).expect("should read"), 4);
    assert_eq!(read_full(&mut reader, &mut buffer).expect("should read"), 2);
    assert_eq!(read_full(&mut reader, &mut buffer).expect("should read"), 0);
}

#[test]
fn probing_missing_file_is_an_open_error() {
    let decoder = FfmpegDecoder::with_binaries(Path::new("ffmpeg"), Path::new("ffprobe"));

    let result = decoder.probe(Path::new("/definitely/not/here.mp4"));
    assert!(matches!(result, Err(DecodeError::Open { .. })));
}

#[test]
fn opening_with_unknown_geometry_fails() {
    let decoder = FfmpegDecoder::with_binaries(Path::new("ffmpeg"), Path::new("ffprobe"));
    let info = VideoInfo {
        fps: 30.0,
        total_frames: 10,
        width: 0,
        height: 0,
    };

    let result = decoder.open(Path::new("clip.mp4"), &info, 1);
    assert!(matches!(result, Err(DecodeError::Probe { .. })));
}

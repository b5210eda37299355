// Integration tests for the video pipeline
// These tests drive VideoPipeline with scripted classifiers and in-memory frames

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};

    use crate::classifier::{ClassifierError, FrameClassifier};
    use crate::emotion::{EmotionLabel, Prediction};
    use crate::pipeline::{
        FailurePolicy, PipelineError, PipelineOptions, Stage, StopCondition, VideoPipeline,
        UNKNOWN_EMOTION,
    };
    use crate::video::{
        Annotator, Frame, FrameRate, FrameSink, FrameSource, VideoError, VideoInfo,
    };
    use EmotionLabel::*;

    const WIDTH: u32 = 320;
    const HEIGHT: u32 = 240;

    struct MemorySource {
        info: VideoInfo,
        next: u64,
        total: u64,
        fail_at: Option<u64>,
        // Cancelled just before the failure, like a Ctrl+C that also killed the decoder
        interrupt: Option<StopCondition>,
    }

    impl MemorySource {
        fn new(total: u64) -> Self {
            Self {
                info: VideoInfo {
                    width: WIDTH,
                    height: HEIGHT,
                    frame_rate: FrameRate::new(25, 1),
                    frame_count: Some(total),
                },
                next: 1,
                total,
                fail_at: None,
                interrupt: None,
            }
        }
    }

    impl FrameSource for MemorySource {
        fn info(&self) -> &VideoInfo {
            &self.info
        }

        fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
            if self.next > self.total {
                return Ok(None);
            }
            if self.fail_at == Some(self.next) {
                if let Some(stop) = &self.interrupt {
                    stop.cancel();
                    return Err(VideoError::Decode("ffmpeg exited with signal: 2".to_string()));
                }
                return Err(VideoError::Decode("corrupt packet".to_string()));
            }
            let frame = Frame::new(self.next, RgbImage::new(WIDTH, HEIGHT));
            self.next += 1;
            Ok(Some(frame))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        path: PathBuf,
        written: Vec<Frame>,
        finished: bool,
        aborted: bool,
        fail_at: Option<usize>,
        interrupt: Option<StopCondition>,
    }

    impl FrameSink for MemorySink {
        fn write_frame(&mut self, frame: &Frame) -> Result<(), VideoError> {
            if self.fail_at == Some(self.written.len() + 1) {
                if let Some(stop) = &self.interrupt {
                    stop.cancel();
                    return Err(VideoError::Encode("Broken pipe (os error 32)".to_string()));
                }
                return Err(VideoError::Encode("disk full".to_string()));
            }
            self.written.push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<(), VideoError> {
            self.finished = true;
            Ok(())
        }

        fn abort(&mut self) {
            self.written.clear();
            self.aborted = true;
        }

        fn output_path(&self) -> &Path {
            &self.path
        }
    }

    // Returns a one-hot prediction per call, cycling through `labels`
    struct ScriptedClassifier {
        labels: Vec<EmotionLabel>,
        calls: Vec<u64>,
        fail_on: Vec<u64>,
        cancel_on: Option<(u64, StopCondition)>,
    }

    impl ScriptedClassifier {
        fn new(labels: Vec<EmotionLabel>) -> Self {
            Self {
                labels,
                calls: Vec::new(),
                fail_on: Vec::new(),
                cancel_on: None,
            }
        }
    }

    impl FrameClassifier for ScriptedClassifier {
        fn classify(&mut self, frame: &Frame) -> Result<Prediction, ClassifierError> {
            let call = self.calls.len();
            self.calls.push(frame.number);

            if let Some((number, stop)) = &self.cancel_on {
                if *number == frame.number {
                    stop.cancel();
                }
            }
            if self.fail_on.contains(&frame.number) {
                return Err(ClassifierError::InferenceError("no face detected".to_string()));
            }

            let label = self.labels[call % self.labels.len()];
            let mut probabilities = [0.0; 4];
            probabilities[label.index()] = 1.0;
            Ok(Prediction::from_probabilities(probabilities))
        }
    }

    fn pipeline(sample_rate: u32, window_size: usize, failure_policy: FailurePolicy) -> VideoPipeline {
        VideoPipeline::new(PipelineOptions {
            sample_rate,
            window_size,
            failure_policy,
            ..PipelineOptions::default()
        })
        .unwrap()
    }

    fn sink() -> MemorySink {
        MemorySink {
            path: PathBuf::from("memory.mp4"),
            ..MemorySink::default()
        }
    }

    // Whether the probability bar for `label` was drawn on the frame
    fn has_bar(frame: &Frame, label: EmotionLabel) -> bool {
        let y = 50 + 30 * (label.index() as u32 + 1) + 10;
        *frame.image.get_pixel(20, y) == Rgb([0, 255, 0])
    }

    #[test]
    fn test_six_normal_four_tired() {
        let pipeline = pipeline(1, 1, FailurePolicy::Abort);
        let mut source = MemorySource::new(10);
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(
            [vec![Normal; 6], vec![TiredSleepy; 4]].concat(),
        );

        let summary = pipeline
            .run(
                &mut source,
                &mut sink,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap();

        assert_eq!(summary.total_frames, 10);
        assert_eq!(summary.processed_frames, 10);
        assert_eq!(summary.failed_frames, 0);
        assert_eq!(summary.dominant_emotion, "normal");
        assert_eq!(summary.emotion_distribution[&Normal], 60.0);
        assert_eq!(summary.emotion_distribution[&TiredSleepy], 40.0);
        assert_eq!(summary.emotion_distribution[&Aggressive], 0.0);
        assert_eq!(summary.emotion_distribution[&LazyNervous], 0.0);
        assert_eq!(summary.processed_video_path, "memory.mp4");

        assert!(sink.finished);
        assert!(!sink.aborted);
        assert_eq!(sink.written.len(), 10);
    }

    #[test]
    fn test_smoothing_delays_label_change() {
        // With a window of 5, the switch to tired only wins once it holds the majority
        let pipeline = pipeline(1, 5, FailurePolicy::Abort);
        let mut source = MemorySource::new(10);
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(
            [vec![Normal; 6], vec![TiredSleepy; 4]].concat(),
        );

        let summary = pipeline
            .run(
                &mut source,
                &mut sink,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap();

        assert_eq!(summary.emotion_distribution[&Normal], 80.0);
        assert_eq!(summary.emotion_distribution[&TiredSleepy], 20.0);
        assert!(has_bar(&sink.written[7], Normal));
        assert!(has_bar(&sink.written[9], TiredSleepy));
    }

    #[test]
    fn test_sample_rate_three() {
        let pipeline = pipeline(3, 5, FailurePolicy::Abort);
        let mut source = MemorySource::new(10);
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(vec![Aggressive]);

        let summary = pipeline
            .run(
                &mut source,
                &mut sink,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap();

        assert_eq!(classifier.calls, vec![3, 6, 9]);
        assert_eq!(summary.processed_frames, 3);
        assert_eq!(summary.total_frames, 10);
        assert_eq!(summary.dominant_emotion, "aggressive");

        // Every frame is written; those before the first sample carry no overlay
        assert_eq!(sink.written.len(), 10);
        assert!(!has_bar(&sink.written[0], Aggressive));
        assert!(!has_bar(&sink.written[1], Aggressive));
        for frame in &sink.written[2..] {
            assert!(has_bar(frame, Aggressive), "frame {} not annotated", frame.number);
        }
    }

    #[test]
    fn test_no_sampled_frames() {
        let pipeline = pipeline(5, 5, FailurePolicy::Abort);
        let mut source = MemorySource::new(2);
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(vec![Normal]);

        let summary = pipeline
            .run(
                &mut source,
                &mut sink,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap();

        assert!(classifier.calls.is_empty());
        assert_eq!(summary.processed_frames, 0);
        assert_eq!(summary.total_frames, 2);
        assert_eq!(summary.dominant_emotion, UNKNOWN_EMOTION);
        assert!(summary.emotion_distribution.values().all(|p| *p == 0.0));
        assert_eq!(sink.written.len(), 2);
        assert!(sink.finished);
    }

    #[test]
    fn test_empty_source() {
        let pipeline = pipeline(1, 5, FailurePolicy::Abort);
        let mut source = MemorySource::new(0);
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(vec![Normal]);

        let summary = pipeline
            .run(
                &mut source,
                &mut sink,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap();

        assert_eq!(summary.total_frames, 0);
        assert_eq!(summary.dominant_emotion, UNKNOWN_EMOTION);
        assert!(sink.finished);
    }

    #[test]
    fn test_skip_policy_excludes_failed_frames() {
        let pipeline = pipeline(1, 5, FailurePolicy::Skip);
        let mut source = MemorySource::new(4);
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(vec![LazyNervous]);
        classifier.fail_on = vec![2];

        let summary = pipeline
            .run(
                &mut source,
                &mut sink,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap();

        assert_eq!(summary.total_frames, 4);
        assert_eq!(summary.processed_frames, 3);
        assert_eq!(summary.failed_frames, 1);
        assert_eq!(summary.emotion_distribution[&LazyNervous], 100.0);

        // The skipped frame still carries the previous overlay
        assert_eq!(sink.written.len(), 4);
        assert!(has_bar(&sink.written[1], LazyNervous));
        assert!(sink.finished);
    }

    #[test]
    fn test_abort_policy_discards_output() {
        let pipeline = pipeline(1, 5, FailurePolicy::Abort);
        let mut source = MemorySource::new(4);
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(vec![Normal]);
        classifier.fail_on = vec![2];

        let err = pipeline
            .run(
                &mut source,
                &mut sink,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap_err();

        assert!(matches!(err, PipelineError::Classify { frame: 2, .. }));
        assert_eq!(err.stage(), Some(Stage::Classify));
        assert!(sink.aborted);
        assert!(!sink.finished);
        assert!(sink.written.is_empty());
    }

    #[test]
    fn test_decode_error_aborts_sink() {
        let pipeline = pipeline(1, 5, FailurePolicy::Skip);
        let mut source = MemorySource::new(5);
        source.fail_at = Some(3);
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(vec![Normal]);

        let err = pipeline
            .run(
                &mut source,
                &mut sink,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Decode));
        assert!(sink.aborted);
    }

    #[test]
    fn test_encode_error_aborts_sink() {
        let pipeline = pipeline(1, 5, FailurePolicy::Abort);
        let mut source = MemorySource::new(5);
        let mut sink = sink();
        sink.fail_at = Some(2);
        let mut classifier = ScriptedClassifier::new(vec![Normal]);

        let err = pipeline
            .run(
                &mut source,
                &mut sink,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Encode));
        assert!(sink.aborted);
    }

    #[test]
    fn test_stop_flag_cancels_before_first_frame() {
        let pipeline = pipeline(1, 5, FailurePolicy::Abort);
        let mut source = MemorySource::new(5);
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(vec![Normal]);
        let stop = StopCondition::new();
        stop.cancel();

        let err = pipeline
            .run(&mut source, &mut sink, &mut classifier, &Annotator::bars_only(), &stop)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { frames: 0 }));
        assert_eq!(err.stage(), None);
        assert!(classifier.calls.is_empty());
        assert!(sink.aborted);
    }

    #[test]
    fn test_stop_flag_cancels_between_frames() {
        let pipeline = pipeline(1, 5, FailurePolicy::Abort);
        let mut source = MemorySource::new(10);
        let mut sink = sink();
        let stop = StopCondition::new();
        let mut classifier = ScriptedClassifier::new(vec![Normal]);
        classifier.cancel_on = Some((3, stop.clone()));

        let err = pipeline
            .run(&mut source, &mut sink, &mut classifier, &Annotator::bars_only(), &stop)
            .unwrap_err();

        // Frame 3 completes, the flag is seen before frame 4 is decoded
        assert!(matches!(err, PipelineError::Cancelled { frames: 3 }));
        assert_eq!(classifier.calls, vec![1, 2, 3]);
        assert!(sink.aborted);
    }

    #[test]
    fn test_decoder_killed_by_interrupt_reports_cancelled() {
        let pipeline = pipeline(1, 5, FailurePolicy::Abort);
        let stop = StopCondition::new();
        let mut source = MemorySource::new(10);
        source.fail_at = Some(4);
        source.interrupt = Some(stop.clone());
        let mut sink = sink();
        let mut classifier = ScriptedClassifier::new(vec![Normal]);

        let err = pipeline
            .run(&mut source, &mut sink, &mut classifier, &Annotator::bars_only(), &stop)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { frames: 3 }));
        assert_eq!(err.stage(), None);
        assert!(sink.aborted);
    }

    #[test]
    fn test_encoder_killed_by_interrupt_reports_cancelled() {
        let pipeline = pipeline(1, 5, FailurePolicy::Abort);
        let stop = StopCondition::new();
        let mut source = MemorySource::new(10);
        let mut sink = sink();
        sink.fail_at = Some(2);
        sink.interrupt = Some(stop.clone());
        let mut classifier = ScriptedClassifier::new(vec![Normal]);

        let err = pipeline
            .run(&mut source, &mut sink, &mut classifier, &Annotator::bars_only(), &stop)
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled { frames: 2 }));
        assert!(sink.aborted);
        assert!(sink.written.is_empty());
    }

    #[test]
    fn test_window_size_zero_rejected() {
        let result = VideoPipeline::new(PipelineOptions {
            window_size: 0,
            ..PipelineOptions::default()
        });
        let err = result.err().unwrap();
        assert_eq!(err.stage(), Some(Stage::Configure));
    }

    #[test]
    fn test_image_sequence_end_to_end() {
        let input = tempfile::tempdir().unwrap();
        for i in 0..4 {
            RgbImage::new(WIDTH, HEIGHT)
                .save(input.path().join(format!("frame_{:03}.png", i)))
                .unwrap();
        }
        let out_root = tempfile::tempdir().unwrap();
        let output = out_root.path().join("annotated");

        let pipeline = pipeline(2, 5, FailurePolicy::Abort);
        let mut classifier = ScriptedClassifier::new(vec![TiredSleepy]);

        let summary = pipeline
            .process_file(
                input.path(),
                &output,
                &mut classifier,
                &Annotator::bars_only(),
                &StopCondition::new(),
            )
            .unwrap();

        assert_eq!(summary.total_frames, 4);
        assert_eq!(summary.processed_frames, 2);
        assert_eq!(summary.dominant_emotion, "tired_sleepy");
        assert_eq!(summary.processed_video_path, output.display().to_string());

        let written = std::fs::read_dir(&output).unwrap().count();
        assert_eq!(written, 4);

        let last = image::open(output.join("frame_000004.png")).unwrap().to_rgb8();
        let frame = Frame::new(4, last);
        assert!(has_bar(&frame, TiredSleepy));
    }
}
